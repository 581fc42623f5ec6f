// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Descriptor-keyed backend over Linux inotify.
//!
//! One notification descriptor serves every watch; the kernel hands back
//! small integer watch descriptors which double as our watch handles. A
//! dedicated reader thread parses each batch the kernel returns and
//! forwards it unchanged in order.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use inotify::{EventMask as InoEventMask, Inotify, WatchDescriptor, WatchMask, Watches};
use tokio::sync::mpsc;

use direvent_core::backend::{Backend, BackendProfile, RawEvent, WatchHandle};
use direvent_core::event::{generic_to_native, EventMask, TransTab, GENEV_CHANGE};

pub const IN_ACCESS: u32 = 0x0000_0001;
pub const IN_MODIFY: u32 = 0x0000_0002;
pub const IN_ATTRIB: u32 = 0x0000_0004;
pub const IN_CLOSE_WRITE: u32 = 0x0000_0008;
pub const IN_CLOSE_NOWRITE: u32 = 0x0000_0010;
pub const IN_OPEN: u32 = 0x0000_0020;
pub const IN_MOVED_FROM: u32 = 0x0000_0040;
pub const IN_MOVED_TO: u32 = 0x0000_0080;
pub const IN_CREATE: u32 = 0x0000_0100;
pub const IN_DELETE: u32 = 0x0000_0200;

const CHANGED_MASK: u32 = IN_CREATE | IN_MOVED_TO | IN_MODIFY;

pub static INOTIFY_PROFILE: BackendProfile = BackendProfile {
    name: "inotify",
    transtab: TransTab(&[
        ("ACCESS", IN_ACCESS),
        ("ATTRIB", IN_ATTRIB),
        ("CLOSE_WRITE", IN_CLOSE_WRITE),
        ("CLOSE_NOWRITE", IN_CLOSE_NOWRITE),
        ("CREATE", IN_CREATE),
        ("DELETE", IN_DELETE),
        ("MODIFY", IN_MODIFY),
        ("MOVED_FROM", IN_MOVED_FROM),
        ("MOVED_TO", IN_MOVED_TO),
        ("OPEN", IN_OPEN),
    ]),
    xlat: &[
        (direvent_core::GENEV_CREATE, IN_CREATE | IN_MOVED_TO),
        (direvent_core::GENEV_WRITE, IN_MODIFY),
        (direvent_core::GENEV_ATTRIB, IN_ATTRIB),
        (direvent_core::GENEV_DELETE, IN_DELETE | IN_MOVED_FROM),
    ],
    changed_mask: CHANGED_MASK,
    close_write: IN_CLOSE_WRITE,
    create_native: IN_CREATE,
    delete_self: 0,
    delete_child: IN_DELETE | IN_MOVED_FROM,
    rescan_mask: 0,
    watch_regular_files: false,
};

pub struct InotifyBackend {
    watches: Watches,
    by_handle: HashMap<WatchHandle, WatchDescriptor>,
}

impl InotifyBackend {
    /// Open the notification descriptor and spawn the reader thread.
    pub fn init(tx: mpsc::Sender<Vec<RawEvent>>) -> io::Result<Self> {
        let inotify = Inotify::init()?;
        let watches = inotify.watches();
        std::thread::Builder::new()
            .name("inotify-reader".to_string())
            .spawn(move || reader(inotify, tx))?;
        Ok(Self {
            watches,
            by_handle: HashMap::new(),
        })
    }
}

impl Backend for InotifyBackend {
    fn profile(&self) -> &'static BackendProfile {
        &INOTIFY_PROFILE
    }

    fn add_watch(
        &mut self,
        path: &Path,
        mask: &EventMask,
        _isdir: bool,
    ) -> io::Result<WatchHandle> {
        let mut native = generic_to_native(mask, INOTIFY_PROFILE.xlat) | mask.native;
        if mask.generic & GENEV_CHANGE != 0 {
            native |= CHANGED_MASK | IN_CLOSE_WRITE;
        }
        let wd = self
            .watches
            .add(path, WatchMask::from_bits_truncate(native))?;
        let handle = WatchHandle::from(wd.get_watch_descriptor_id());
        self.by_handle.insert(handle, wd);
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle, path: &Path) {
        if let Some(wd) = self.by_handle.remove(&handle) {
            // The kernel releases the descriptor itself when the watched
            // path is gone, so a failure here is expected noise.
            if let Err(error) = self.watches.remove(wd) {
                tracing::debug!(path = %path.display(), %error, "inotify watch removal");
            }
        }
    }
}

fn reader(mut inotify: Inotify, tx: mpsc::Sender<Vec<RawEvent>>) {
    let mut buffer = [0u8; 4096];
    loop {
        match inotify.read_events_blocking(&mut buffer) {
            Ok(events) => {
                let batch: Vec<RawEvent> = events.filter_map(map_event).collect();
                if !batch.is_empty() && tx.blocking_send(batch).is_err() {
                    break;
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                tracing::error!(%error, "inotify read failed");
                break;
            }
        }
    }
}

fn map_event(event: inotify::Event<&std::ffi::OsStr>) -> Option<RawEvent> {
    let wd = WatchHandle::from(event.wd.get_watch_descriptor_id());
    if event.mask.contains(InoEventMask::Q_OVERFLOW) {
        return Some(RawEvent::Overflow);
    }
    if event.mask.contains(InoEventMask::IGNORED) {
        return Some(RawEvent::Removed { wd });
    }
    if event.mask.contains(InoEventMask::UNMOUNT) {
        // IGNORED follows on its own; nothing to deliver for the unmount.
        tracing::debug!(wd, "watched filesystem unmounted");
        return None;
    }
    Some(RawEvent::Notify {
        wd,
        mask: event.mask.bits(),
        name: event.name.map(|n| n.to_os_string()),
    })
}

#[cfg(test)]
#[path = "inotify_tests.rs"]
mod tests;
