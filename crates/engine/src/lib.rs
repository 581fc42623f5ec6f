// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! direvent-engine: the watcher runtime.
//!
//! Owns the watchpoint registry, the copy-on-write handler lists, the
//! event dispatcher and the child-process subsystem. The daemon drives it
//! from a single loop: dispatch a batch of native events, then run the
//! maintenance pass (reaping, timeout kills, recent-cache expiry, garbage
//! collection).

mod dispatch;
mod engine;
pub mod error;
pub mod handler;
pub mod process;
pub mod store;
mod watcher;

pub use engine::Engine;
pub use error::EngineError;
pub use handler::{Handler, HandlerAction, HandlerFlags, HandlerList, ProgHandler};
pub use process::{ProcessTable, CHILD_VARS, DEFAULT_TIMEOUT, MACRO_VARS};
pub use store::{Registry, WatchpointId, RECENT_TTL};
