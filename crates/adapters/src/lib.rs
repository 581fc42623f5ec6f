// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Native event backends for the direvent daemon.
//!
//! One backend is compiled per platform: descriptor-keyed inotify on
//! Linux, fd-per-watch kqueue on the BSDs and macOS. Both deliver batches
//! of [`direvent_core::RawEvent`] over an mpsc channel from a dedicated
//! reader thread and register watches through the
//! [`direvent_core::Backend`] trait.

/// Capacity of the event-batch channel between a reader and the engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[cfg(target_os = "linux")]
mod inotify;
#[cfg(target_os = "linux")]
pub use crate::inotify::{InotifyBackend as SysBackend, INOTIFY_PROFILE as SYS_PROFILE};

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use crate::kqueue::{KqueueBackend as SysBackend, KQUEUE_PROFILE as SYS_PROFILE};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, WatchCall, FAKE_FD_PROFILE, FAKE_PROFILE};
