// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The contract between the watcher runtime and a native event backend.
//!
//! A backend registers and releases kernel watches; events flow back as
//! batches of [`RawEvent`] over a channel fed by the backend's reader,
//! preserving the order the kernel returned them. Per-backend behavior
//! that the dispatcher needs (change-mask composition, delete semantics,
//! rescan triggers) is described by a [`BackendProfile`] of constants so
//! the dispatch logic itself stays uniform.

use std::ffi::OsString;
use std::io;
use std::path::Path;

use crate::event::{EventMask, TransTab};

/// Backend-assigned watch identifier.
pub type WatchHandle = i64;

/// One native notification, as delivered by a backend reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    /// A native event on a watched location. `name` is set when the event
    /// names a directory entry rather than the watched location itself.
    Notify {
        wd: WatchHandle,
        mask: u32,
        name: Option<OsString>,
    },
    /// The kernel dropped the watch (deleted, unmounted).
    Removed { wd: WatchHandle },
    /// The native event queue overflowed; events were lost.
    Overflow,
}

/// Constants describing a backend to the dispatcher.
#[derive(Debug)]
pub struct BackendProfile {
    pub name: &'static str,
    /// Symbolic names for the native event bits.
    pub transtab: TransTab,
    /// Generic-to-native translation rows.
    pub xlat: &'static [(u32, u32)],
    /// Native bits that mark a file as modified for `CHANGE` synthesis.
    pub changed_mask: u32,
    /// Native close-after-write bit that fires the synthesized `CHANGE`.
    pub close_write: u32,
    /// Native bit announcing a new directory entry, if the backend has
    /// one; checked against the recent-creation cache.
    pub create_native: u32,
    /// Native bits meaning the watched location itself is gone.
    pub delete_self: u32,
    /// Native bits meaning a named child is gone.
    pub delete_child: u32,
    /// Native bits that trigger a directory rescan for created entries.
    pub rescan_mask: u32,
    /// Whether subtree coverage extends to regular files (one watch per
    /// file), as opposed to directory-level watches only.
    pub watch_regular_files: bool,
}

/// Watch registration interface implemented by each backend.
pub trait Backend {
    fn profile(&self) -> &'static BackendProfile;

    /// Attach a watch. The generic half of `mask` is expanded with the
    /// backend's translation table; `CHANGE` additionally subscribes the
    /// backend's change-composition bits.
    fn add_watch(&mut self, path: &Path, mask: &EventMask, isdir: bool)
        -> io::Result<WatchHandle>;

    /// Release a watch.
    fn remove_watch(&mut self, handle: WatchHandle, path: &Path);
}
