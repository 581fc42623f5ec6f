// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handlers and copy-on-write handler lists.
//!
//! A handler is immutable once built: an event mask, a filename-pattern
//! list, and an action. Watchpoints share lists copy-on-write: cloning a
//! [`HandlerList`] shares the underlying list, and mutation through the
//! `_cow` entry points detaches a private copy first when the list is
//! shared.
//!
//! Iteration stays valid across concurrent mutation. Each list keeps a
//! ledger of live cursors; removing the entry a cursor sits on advances
//! that cursor and flags it so the next step reads the new position
//! verbatim. Entries appended after a cursor was created are not visited
//! by it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use direvent_core::{EnvopProgram, EventMask, PatternList};

use crate::store::WatchpointId;

/// Program-handler flags from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerFlags {
    /// Don't wait for the child to terminate.
    pub nowait: bool,
    /// Capture stdout and forward it to the log at info severity.
    pub capture_stdout: bool,
    /// Capture stderr and forward it to the log at error severity.
    pub capture_stderr: bool,
    /// Run the command through `$SHELL -c`.
    pub shell: bool,
}

/// An external command to run for matching events.
#[derive(Debug, Clone)]
pub struct ProgHandler {
    pub command: String,
    pub flags: HandlerFlags,
    /// Run as this user unless it is root or the daemon's own uid.
    pub uid: Option<u32>,
    /// Primary group first.
    pub gids: Vec<u32>,
    pub timeout: Duration,
    pub envop: EnvopProgram,
}

/// What a handler does when it fires.
#[derive(Debug)]
pub enum HandlerAction {
    /// Launch an external command.
    Command(ProgHandler),
    /// Reinstate a missing watchpoint when its name reappears in the
    /// parent directory.
    Sentinel { target: WatchpointId },
    /// Install subtree watchpoints for entries created in this directory.
    DirectorySentinel,
}

#[derive(Debug)]
pub struct Handler {
    pub mask: EventMask,
    pub patterns: PatternList,
    /// Run even for non-notifying deliveries (initial scans).
    pub notify_always: bool,
    pub action: HandlerAction,
}

impl Handler {
    pub fn program(mask: EventMask, patterns: PatternList, prog: ProgHandler) -> Self {
        Handler {
            mask,
            patterns,
            notify_always: false,
            action: HandlerAction::Command(prog),
        }
    }
}

#[derive(Debug)]
struct Cursor {
    id: u64,
    pos: usize,
    /// Exclusive bound: entries appended after the cursor was created lie
    /// beyond it and are not visited.
    end: usize,
    advanced: bool,
    started: bool,
}

#[derive(Debug, Default)]
struct ListInner {
    entries: Vec<Arc<Handler>>,
    cursors: Vec<Cursor>,
    next_cursor: u64,
}

impl ListInner {
    fn remove(&mut self, handler: &Arc<Handler>) -> usize {
        let Some(idx) = self
            .entries
            .iter()
            .position(|h| Arc::ptr_eq(h, handler))
        else {
            return self.entries.len();
        };
        self.entries.remove(idx);
        for cursor in &mut self.cursors {
            if idx < cursor.pos {
                cursor.pos -= 1;
            } else if idx == cursor.pos {
                cursor.advanced = true;
            }
            if idx < cursor.end {
                cursor.end -= 1;
            }
        }
        self.entries.len()
    }
}

/// A shared, reference-counted handler list. `clone` shares the list; the
/// reference count gates the `_cow` mutation entry points.
#[derive(Debug, Default)]
pub struct HandlerList {
    inner: Arc<Mutex<ListInner>>,
}

impl Clone for HandlerList {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl HandlerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Number of owners sharing this list.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Append in place, visible to every owner.
    pub fn append(&self, handler: Arc<Handler>) {
        self.inner.lock().entries.push(handler);
    }

    /// Remove in place. Live cursors on the removed entry advance past
    /// it. Returns the remaining length.
    pub fn remove(&self, handler: &Arc<Handler>) -> usize {
        self.inner.lock().remove(handler)
    }

    /// Append through copy-on-write: a shared list is detached first.
    pub fn append_cow(&mut self, handler: Arc<Handler>) {
        self.unshare();
        self.append(handler);
    }

    /// Remove through copy-on-write: a shared list is detached first.
    pub fn remove_cow(&mut self, handler: &Arc<Handler>) -> usize {
        self.unshare();
        self.remove(handler)
    }

    fn unshare(&mut self) {
        if Arc::strong_count(&self.inner) > 1 {
            let entries = self.inner.lock().entries.clone();
            self.inner = Arc::new(Mutex::new(ListInner {
                entries,
                cursors: Vec::new(),
                next_cursor: 0,
            }));
        }
    }

    /// Begin a live iteration. The cursor holds no strong reference: if
    /// every owner drops the list, iteration simply ends.
    pub fn iter(&self) -> HandlerIter {
        let mut inner = self.inner.lock();
        let id = inner.next_cursor;
        inner.next_cursor += 1;
        let end = inner.entries.len();
        inner.cursors.push(Cursor {
            id,
            pos: 0,
            end,
            advanced: false,
            started: false,
        });
        HandlerIter {
            list: Arc::downgrade(&self.inner),
            cursor: id,
        }
    }

    /// Current entries, for read-only walks that outlive no mutation.
    pub fn snapshot(&self) -> Vec<Arc<Handler>> {
        self.inner.lock().entries.clone()
    }

    /// Union of every handler's event mask.
    pub fn mask_union(&self) -> EventMask {
        self.inner
            .lock()
            .entries
            .iter()
            .fold(EventMask::EMPTY, |acc, h| acc.or(&h.mask))
    }

    pub fn contains_directory_sentinel(&self) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|h| matches!(h.action, HandlerAction::DirectorySentinel))
    }
}

/// A live cursor over a [`HandlerList`].
#[derive(Debug)]
pub struct HandlerIter {
    list: Weak<Mutex<ListInner>>,
    cursor: u64,
}

impl HandlerIter {
    #[allow(clippy::should_implement_trait)] // mutation-aware, not an Iterator
    pub fn next(&mut self) -> Option<Arc<Handler>> {
        let inner = self.list.upgrade()?;
        let mut guard = inner.lock();
        let idx = guard.cursors.iter().position(|c| c.id == self.cursor)?;
        {
            let cursor = &mut guard.cursors[idx];
            if !cursor.started {
                cursor.started = true;
                cursor.advanced = false;
            } else if cursor.advanced {
                cursor.advanced = false;
            } else {
                cursor.pos += 1;
            }
        }
        let (pos, end) = {
            let cursor = &guard.cursors[idx];
            (cursor.pos, cursor.end)
        };
        if pos >= end.min(guard.entries.len()) {
            guard.cursors.remove(idx);
            drop(guard);
            self.list = Weak::new();
            return None;
        }
        Some(Arc::clone(&guard.entries[pos]))
    }
}

impl Drop for HandlerIter {
    fn drop(&mut self) {
        if let Some(inner) = self.list.upgrade() {
            inner.lock().cursors.retain(|c| c.id != self.cursor);
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
