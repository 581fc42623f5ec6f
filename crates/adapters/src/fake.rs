// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted backend for engine tests.
//!
//! Records every registration, hands out sequential handles, and lets a
//! test fail chosen paths. Events are pushed straight into the engine's
//! channel by the test itself.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use direvent_core::backend::{Backend, BackendProfile, WatchHandle};
use direvent_core::event::{EventMask, TransTab};
use direvent_core::{GENEV_ATTRIB, GENEV_CREATE, GENEV_DELETE, GENEV_WRITE};

pub const FAKE_CREATE: u32 = 0x01;
pub const FAKE_DELETE: u32 = 0x02;
pub const FAKE_MODIFY: u32 = 0x04;
pub const FAKE_ATTRIB: u32 = 0x08;
pub const FAKE_CLOSE_WRITE: u32 = 0x10;
pub const FAKE_MOVED_FROM: u32 = 0x20;
pub const FAKE_MOVED_TO: u32 = 0x40;
pub const FAKE_WRITE_SELF: u32 = 0x80;

const FAKE_TRANSTAB: TransTab = TransTab(&[
    ("CREATE", FAKE_CREATE),
    ("DELETE", FAKE_DELETE),
    ("MODIFY", FAKE_MODIFY),
    ("ATTRIB", FAKE_ATTRIB),
    ("CLOSE_WRITE", FAKE_CLOSE_WRITE),
    ("MOVED_FROM", FAKE_MOVED_FROM),
    ("MOVED_TO", FAKE_MOVED_TO),
    ("WRITE_SELF", FAKE_WRITE_SELF),
]);

const FAKE_XLAT: &[(u32, u32)] = &[
    (GENEV_CREATE, FAKE_CREATE | FAKE_MOVED_TO),
    (GENEV_WRITE, FAKE_MODIFY),
    (GENEV_ATTRIB, FAKE_ATTRIB),
    (GENEV_DELETE, FAKE_DELETE | FAKE_MOVED_FROM),
];

/// Descriptor-keyed flavor: child events carry names, deletion of the
/// watchpoint itself arrives as a removal notification.
pub static FAKE_PROFILE: BackendProfile = BackendProfile {
    name: "fake",
    transtab: FAKE_TRANSTAB,
    xlat: FAKE_XLAT,
    changed_mask: FAKE_CREATE | FAKE_MOVED_TO | FAKE_MODIFY,
    close_write: FAKE_CLOSE_WRITE,
    create_native: FAKE_CREATE,
    delete_self: 0,
    delete_child: FAKE_DELETE | FAKE_MOVED_FROM,
    rescan_mask: 0,
    watch_regular_files: false,
};

/// Fd-per-watch flavor: nameless events, per-watch deletion and a
/// directory-rescan trigger.
pub static FAKE_FD_PROFILE: BackendProfile = BackendProfile {
    name: "fake-fd",
    transtab: FAKE_TRANSTAB,
    xlat: &[
        (GENEV_WRITE, FAKE_MODIFY),
        (GENEV_ATTRIB, FAKE_ATTRIB),
        (GENEV_DELETE, FAKE_DELETE | FAKE_MOVED_FROM),
    ],
    changed_mask: FAKE_MODIFY,
    close_write: FAKE_CLOSE_WRITE,
    create_native: 0,
    delete_self: FAKE_DELETE | FAKE_MOVED_FROM,
    delete_child: 0,
    rescan_mask: FAKE_WRITE_SELF,
    watch_regular_files: true,
};

/// One recorded registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCall {
    pub handle: WatchHandle,
    pub path: PathBuf,
    pub mask: EventMask,
    pub isdir: bool,
    pub active: bool,
}

pub struct FakeBackend {
    profile: &'static BackendProfile,
    calls: Arc<Mutex<Vec<WatchCall>>>,
    fail_paths: HashSet<PathBuf>,
    next_handle: WatchHandle,
}

impl FakeBackend {
    pub fn new(profile: &'static BackendProfile) -> Self {
        Self {
            profile,
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_paths: HashSet::new(),
            next_handle: 0,
        }
    }

    /// Make `add_watch` fail for this path.
    pub fn fail_on(&mut self, path: &Path) {
        self.fail_paths.insert(path.to_path_buf());
    }

    /// Shared view of every registration made so far.
    pub fn calls(&self) -> Arc<Mutex<Vec<WatchCall>>> {
        Arc::clone(&self.calls)
    }

    /// Handle of the active watch on `path`, if any.
    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.calls
            .lock()
            .iter()
            .find(|c| c.active && c.path == path)
            .map(|c| c.handle)
    }

    pub fn active_count(&self) -> usize {
        self.calls.lock().iter().filter(|c| c.active).count()
    }
}

impl Backend for FakeBackend {
    fn profile(&self) -> &'static BackendProfile {
        self.profile
    }

    fn add_watch(&mut self, path: &Path, mask: &EventMask, isdir: bool) -> io::Result<WatchHandle> {
        if self.fail_paths.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "watch refused by test",
            ));
        }
        self.next_handle += 1;
        self.calls.lock().push(WatchCall {
            handle: self.next_handle,
            path: path.to_path_buf(),
            mask: *mask,
            isdir,
            active: true,
        });
        Ok(self.next_handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle, _path: &Path) {
        if let Some(call) = self
            .calls
            .lock()
            .iter_mut()
            .find(|c| c.active && c.handle == handle)
        {
            call.active = false;
        }
    }
}
