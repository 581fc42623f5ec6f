// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The watchpoint registry.
//!
//! Watchpoints live in an arena keyed by stable ids (index plus
//! generation), so sentinels, parent links and the backend side tables
//! hold ids instead of pointers; a reused slot invalidates stale ids.
//! Reference counts gate destruction: the path index, a backend
//! registration and a pending missing-path sentinel each hold one
//! reference.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use direvent_core::backend::WatchHandle;

use crate::handler::HandlerList;

/// How long a recent-creation cache suppresses duplicate CREATE events.
pub const RECENT_TTL: Duration = Duration::from_secs(1);

/// Stable arena id of a watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchpointId {
    index: u32,
    generation: u32,
}

/// Short-lived per-watchpoint set of names used to suppress duplicate
/// CREATE deliveries after the sentinel-to-install transition.
#[derive(Debug)]
pub struct RecentSet {
    names: HashSet<OsString>,
    since: Instant,
}

/// A watched filesystem path and everything the daemon knows about it.
#[derive(Debug)]
pub struct Watchpoint {
    pub dirname: PathBuf,
    /// Backend handle; `None` while the watchpoint waits as a sentinel.
    pub wd: Option<WatchHandle>,
    pub isdir: bool,
    /// Remaining recursion depth for subtree coverage.
    pub depth: u32,
    pub parent: Option<WatchpointId>,
    pub handlers: HandlerList,
    pub recent: Option<RecentSet>,
    /// Changed-files tracking for CHANGE synthesis, keyed by name on the
    /// descriptor-keyed backend and by watchpoint on fd-per-watch.
    pub files_changed: HashSet<OsString>,
    pub file_changed: bool,
    /// Last observed ctime, for the fd-per-watch directory rescan.
    pub file_ctime: i64,
    refcnt: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Watchpoint>,
}

#[derive(Debug, Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_path: HashMap<PathBuf, WatchpointId>,
    by_wd: HashMap<WatchHandle, WatchpointId>,
    recent_order: VecDeque<WatchpointId>,
    gc: Vec<WatchpointId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup-or-insert by path. A fresh watchpoint starts uninstalled
    /// with an empty handler list and one reference held by the path
    /// index. Returns the id and whether it was created.
    pub fn install(&mut self, path: &Path) -> (WatchpointId, bool) {
        if let Some(&id) = self.by_path.get(path) {
            return (id, false);
        }
        let wp = Watchpoint {
            dirname: path.to_path_buf(),
            wd: None,
            isdir: false,
            depth: 0,
            parent: None,
            handlers: HandlerList::new(),
            recent: None,
            files_changed: HashSet::new(),
            file_changed: false,
            file_ctime: 0,
            refcnt: 1,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(wp);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(wp),
                });
                (self.slots.len() - 1) as u32
            }
        };
        let id = WatchpointId {
            index,
            generation: self.slots[index as usize].generation,
        };
        self.by_path.insert(path.to_path_buf(), id);
        (id, true)
    }

    /// Put a watchpoint that was removed from the path index back,
    /// taking a new reference for it.
    pub fn reinstall(&mut self, id: WatchpointId) {
        let Some(wp) = self.get(id) else { return };
        let path = wp.dirname.clone();
        if self.by_path.insert(path, id) != Some(id) {
            self.add_ref(id);
        }
    }

    pub fn lookup(&self, path: &Path) -> Option<WatchpointId> {
        self.by_path.get(path).copied()
    }

    pub fn by_wd(&self, wd: WatchHandle) -> Option<WatchpointId> {
        self.by_wd.get(&wd).copied()
    }

    pub fn get(&self, id: WatchpointId) -> Option<&Watchpoint> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub fn get_mut(&mut self, id: WatchpointId) -> Option<&mut Watchpoint> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    /// Number of watchpoints reachable by path.
    pub fn path_count(&self) -> usize {
        self.by_path.len()
    }

    /// Snapshot of every watchpoint currently reachable by path.
    pub fn ids(&self) -> Vec<WatchpointId> {
        self.by_path.values().copied().collect()
    }

    pub fn any_installed(&self) -> bool {
        self.by_path
            .values()
            .filter_map(|&id| self.get(id))
            .any(|wp| wp.wd.is_some())
    }

    pub fn add_ref(&mut self, id: WatchpointId) {
        if let Some(wp) = self.get_mut(id) {
            wp.refcnt += 1;
        }
    }

    /// Drop one reference; the watchpoint is freed at zero.
    pub fn unref(&mut self, id: WatchpointId) {
        let Some(wp) = self.get_mut(id) else { return };
        wp.refcnt -= 1;
        if wp.refcnt > 0 {
            return;
        }
        self.recent_unlink(id);
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            slot.entry = None;
            slot.generation += 1;
            self.free.push(id.index);
        }
    }

    /// Record the backend registration, taking a reference for it.
    pub fn set_wd(&mut self, id: WatchpointId, wd: WatchHandle) {
        let Some(wp) = self.get_mut(id) else { return };
        wp.wd = Some(wd);
        self.by_wd.insert(wd, id);
        self.add_ref(id);
    }

    /// Release the backend registration and its reference.
    pub fn clear_wd(&mut self, id: WatchpointId) {
        let Some(wd) = self.get_mut(id).and_then(|wp| wp.wd.take()) else {
            return;
        };
        self.by_wd.remove(&wd);
        self.unref(id);
    }

    /// Drop the path index's reference.
    pub fn remove_path(&mut self, id: WatchpointId) {
        let Some(wp) = self.get(id) else { return };
        let path = wp.dirname.clone();
        if self.by_path.get(&path) == Some(&id) {
            self.by_path.remove(&path);
            self.unref(id);
        }
    }

    /// Queue a watchpoint for destruction after the current dispatch
    /// step.
    pub fn queue_gc(&mut self, id: WatchpointId) {
        self.gc.push(id);
    }

    pub fn take_gc(&mut self) -> Vec<WatchpointId> {
        std::mem::take(&mut self.gc)
    }

    /// Start a recent-creation cache on the watchpoint.
    pub fn recent_init(&mut self, id: WatchpointId) {
        let Some(wp) = self.get_mut(id) else { return };
        if wp.recent.is_some() {
            return;
        }
        wp.recent = Some(RecentSet {
            names: HashSet::new(),
            since: Instant::now(),
        });
        self.recent_order.push_back(id);
    }

    pub fn recent_deinit(&mut self, id: WatchpointId) {
        let had = {
            let Some(wp) = self.get_mut(id) else { return };
            if wp.recent.take().is_some() {
                debug!("{}: recent status expired", wp.dirname.display());
                true
            } else {
                false
            }
        };
        if had {
            self.recent_order.retain(|&r| r != id);
        }
    }

    fn recent_unlink(&mut self, id: WatchpointId) {
        self.recent_order.retain(|&r| r != id);
    }

    /// Look a name up in the recent cache, installing it. Returns whether
    /// the name was already present. Without a cache, never suppresses.
    pub fn recent_seen(&mut self, id: WatchpointId, name: &OsStr) -> bool {
        let Some(wp) = self.get_mut(id) else {
            return false;
        };
        let Some(recent) = wp.recent.as_mut() else {
            return false;
        };
        let seen = !recent.names.insert(name.to_os_string());
        debug!(
            "recent lookup: {} {}: {}",
            wp.dirname.display(),
            name.to_string_lossy(),
            seen
        );
        seen
    }

    /// Expire recent caches older than [`RECENT_TTL`].
    pub fn recent_cleanup(&mut self, now: Instant) {
        while let Some(&id) = self.recent_order.front() {
            let expired = match self.get(id) {
                Some(wp) => match &wp.recent {
                    Some(recent) => now.duration_since(recent.since) >= RECENT_TTL,
                    None => true,
                },
                None => true,
            };
            if !expired {
                break;
            }
            self.recent_order.pop_front();
            if let Some(wp) = self.get_mut(id) {
                if wp.recent.take().is_some() {
                    debug!("{}: recent status expired", wp.dirname.display());
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn refcnt(&self, id: WatchpointId) -> Option<u32> {
        self.get(id).map(|wp| wp.refcnt)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
