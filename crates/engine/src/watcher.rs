// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watchpoint installation, sentinels, subtree scanning, suspension.
//!
//! Two kinds of sentinel keep coverage alive. A missing-path sentinel
//! watches the parent directory for the reappearance of a specific name
//! and reinstates the real watchpoint when it fires. A directory sentinel
//! rides on every directory watchpoint with remaining depth (and on every
//! watchpoint for fd-per-watch backends) and installs subtree watchpoints
//! as entries appear.

use std::ffi::OsStr;
use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info};

use direvent_core::backend::Backend;
use direvent_core::{mkfilename, split_pathname, EventMask, PatternList, GENEV_CREATE};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::handler::{Handler, HandlerAction};
use crate::store::WatchpointId;

impl<B: Backend> Engine<B> {
    /// Attach the backend to a watchpoint's path. A missing path gets a
    /// sentinel on its parent instead and still counts as success.
    pub(crate) fn watchpoint_init(&mut self, id: WatchpointId) -> Result<(), EngineError> {
        let Some(wp) = self.store.get(id) else {
            return Ok(());
        };
        if wp.wd.is_some() {
            return Ok(());
        }
        let path = wp.dirname.clone();
        debug!("creating watcher {}", path.display());

        let md = match fs::metadata(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return self.install_sentinel(id);
            }
            Err(source) => {
                error!("cannot set watcher on {}: {}", path.display(), source);
                return Err(EngineError::Watch { path, source });
            }
            Ok(md) => md,
        };

        let isdir = md.is_dir();
        let mask = match self.store.get(id) {
            Some(wp) => wp.handlers.mask_union(),
            None => return Ok(()),
        };
        debug!(
            "{}: gen={:x}, sys={:x}",
            path.display(),
            mask.generic,
            mask.native
        );

        let wd = match self.backend.add_watch(&path, &mask, isdir) {
            Ok(wd) => wd,
            Err(source) => {
                error!("cannot set watcher on {}: {}", path.display(), source);
                return Err(EngineError::Watch { path, source });
            }
        };
        if let Some(wp) = self.store.get_mut(id) {
            wp.isdir = isdir;
            wp.file_ctime = md.ctime();
        }
        self.store.set_wd(id, wd);
        Ok(())
    }

    /// Install a CREATE sentinel for a missing watchpoint on its parent
    /// directory. The sentinel holds a reference that keeps the target
    /// alive while it waits.
    pub(crate) fn install_sentinel(&mut self, target: WatchpointId) -> Result<(), EngineError> {
        let Some(wp) = self.store.get(target) else {
            return Ok(());
        };
        let target_path = wp.dirname.clone();
        let (dir, name) = split_pathname(&target_path);

        let (sentinel_wp, _created) = self.store.install(&dir);
        let mut patterns = PatternList::new();
        patterns.add_exact(&name.to_string_lossy());
        let handler = Handler {
            mask: EventMask::generic(GENEV_CREATE),
            patterns,
            notify_always: true,
            action: HandlerAction::Sentinel { target },
        };
        self.store.add_ref(target);
        if let Some(sent) = self.store.get(sentinel_wp) {
            sent.handlers.append(Arc::new(handler));
        }
        info!("installing CREATE sentinel for {}", target_path.display());
        self.watchpoint_init(sentinel_wp)
    }

    /// Attach a directory sentinel through the COW entry point.
    pub(crate) fn attach_directory_sentinel(&mut self, id: WatchpointId) {
        let handler = Handler {
            mask: EventMask::generic(GENEV_CREATE),
            patterns: PatternList::new(),
            notify_always: true,
            action: HandlerAction::DirectorySentinel,
        };
        if let Some(wp) = self.store.get_mut(id) {
            info!("installing CREATE sentinel for {}/*", wp.dirname.display());
            wp.handlers.append_cow(Arc::new(handler));
        }
    }

    /// Whether any handler's pattern list accepts the name.
    pub(crate) fn pattern_match(&self, id: WatchpointId, name: &str) -> bool {
        let Some(wp) = self.store.get(id) else {
            return false;
        };
        wp.handlers
            .snapshot()
            .iter()
            .any(|h| h.patterns.matches(name))
    }

    /// Deliver a CREATE for `name` under the watchpoint, unless the
    /// recent cache has already seen it.
    pub(crate) fn deliver_ev_create<'a>(
        &'a mut self,
        id: WatchpointId,
        dirname: &'a Path,
        name: &'a OsStr,
        notify: bool,
    ) -> Pin<Box<dyn Future<Output = ()> + 'a>> {
        Box::pin(async move {
            if self.store.recent_seen(id, name) {
                return;
            }
            debug!(
                "delivering CREATE for {}/{}",
                dirname.display(),
                name.to_string_lossy()
            );
            let event = EventMask::generic(GENEV_CREATE);
            let name_str = name.to_string_lossy().into_owned();
            let mut it = match self.store.get(id) {
                Some(wp) => wp.handlers.iter(),
                None => return,
            };
            while let Some(handler) = it.next() {
                if handler.mask.generic & GENEV_CREATE != 0
                    && handler.patterns.matches(&name_str)
                    && (notify || handler.notify_always)
                {
                    self.run_handler(id, &handler, &event, dirname, name, notify)
                        .await;
                }
            }
        })
    }

    /// Run every handler whose mask intersects the event and whose
    /// patterns accept the file name, in list order.
    pub(crate) async fn run_handlers(
        &mut self,
        id: WatchpointId,
        event: &EventMask,
        dirname: &Path,
        filename: &OsStr,
    ) {
        let name_str = filename.to_string_lossy().into_owned();
        let mut it = match self.store.get(id) {
            Some(wp) => wp.handlers.iter(),
            None => return,
        };
        while let Some(handler) = it.next() {
            let hit = event.and(&handler.mask);
            if !hit.is_empty() && handler.patterns.matches(&name_str) {
                self.run_handler(id, &handler, &hit, dirname, filename, true)
                    .await;
            }
        }
    }

    pub(crate) async fn run_handler(
        &mut self,
        id: WatchpointId,
        handler: &Arc<Handler>,
        event: &EventMask,
        dirname: &Path,
        filename: &OsStr,
        notify: bool,
    ) {
        match &handler.action {
            HandlerAction::Command(prog) => {
                if !notify || prog.command.is_empty() {
                    return;
                }
                if let Err(error) = self.run_prog_handler(prog, event, dirname, filename).await {
                    error!(%error, "handler failed");
                }
            }
            HandlerAction::Sentinel { target } => {
                let target = *target;
                self.sentinel_fire(id, handler, target, dirname, filename, notify)
                    .await;
            }
            HandlerAction::DirectorySentinel => {
                self.directory_sentinel_fire(id, handler, dirname, filename, notify)
                    .await;
            }
        }
    }

    /// A missing path reappeared: reinstate the suspended watchpoint,
    /// deliver the synthetic CREATE, then retire the sentinel handler.
    async fn sentinel_fire(
        &mut self,
        sentinel_wp: WatchpointId,
        handler: &Arc<Handler>,
        target: WatchpointId,
        dirname: &Path,
        filename: &OsStr,
        notify: bool,
    ) {
        if self.store.get(target).is_some() {
            debug!("reinstating watchpoint from sentinel");
            if self.watchpoint_init(target).is_err() {
                error!("sentinel could not reinstate its watchpoint");
            }
            self.store.reinstall(target);
            self.deliver_ev_create(target, dirname, filename, notify)
                .await;
        }
        let remaining = match self.store.get(sentinel_wp) {
            Some(wp) => wp.handlers.remove(handler),
            None => 0,
        };
        if remaining == 0 {
            self.store.queue_gc(sentinel_wp);
        }
        self.store.unref(target);
    }

    /// A new directory entry appeared under a watched directory: install
    /// a subtree watchpoint for it when eligible.
    async fn directory_sentinel_fire(
        &mut self,
        parent: WatchpointId,
        handler: &Arc<Handler>,
        dirname: &Path,
        filename: &OsStr,
        notify: bool,
    ) {
        let Some(parent_wp) = self.store.get(parent) else {
            return;
        };
        let parent_depth = parent_wp.depth;
        let parent_handlers = parent_wp.handlers.clone();
        let subtree_files = self.backend.profile().watch_regular_files;

        let path = mkfilename(dirname, filename);
        let md = match fs::metadata(&path) {
            Ok(md) => md,
            Err(error) => {
                error!(
                    "cannot create watcher {}, stat failed: {}",
                    path.display(),
                    error
                );
                return;
            }
        };
        let eligible = if md.is_dir() {
            parent_depth > 0
        } else {
            subtree_files
        };
        if !eligible {
            return;
        }

        let (child, created) = self.store.install(&path);
        if !created {
            return;
        }
        let child_depth = parent_depth.saturating_sub(1);
        if let Some(wp) = self.store.get_mut(child) {
            wp.depth = child_depth;
            wp.handlers = parent_handlers;
        }
        if subtree_files || child_depth > 0 {
            self.attach_directory_sentinel(child);
        }
        // The copied list still carries the parent's own directory
        // sentinel; the child must not run it.
        let remaining = match self.store.get_mut(child) {
            Some(wp) => wp.handlers.remove_cow(handler),
            None => return,
        };
        if remaining == 0 {
            self.store.queue_gc(child);
            return;
        }
        if let Some(wp) = self.store.get_mut(child) {
            wp.parent = Some(parent);
        }
        debug!("creating watchpoint from directory sentinel");
        if self.watchpoint_init(child).is_ok() {
            self.store.recent_init(child);
            self.watch_subdirs(child, notify).await;
        }
    }

    /// Scan a directory's entries, delivering a CREATE for each eligible
    /// name. Symbolic links are not followed.
    pub(crate) async fn watch_subdirs(&mut self, parent: WatchpointId, notify: bool) {
        let Some(wp) = self.store.get(parent) else {
            return;
        };
        if !wp.isdir {
            return;
        }
        let path = wp.dirname.clone();
        let depth = wp.depth;
        debug!("watch_subdirs: {}", path.display());

        let scan = self.backend.profile().watch_regular_files || depth > 0;
        if !scan && !notify {
            return;
        }
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(error) => {
                error!("cannot open directory {}: {}", path.display(), error);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let full = mkfilename(&path, &name);
            if self.store.lookup(&full).is_some() {
                // Skip existing watchpoint
                continue;
            }
            match fs::symlink_metadata(&full) {
                Err(error) => {
                    error!("cannot stat {}: {}", full.display(), error);
                    continue;
                }
                Ok(md) if md.file_type().is_symlink() => continue,
                Ok(_) => {}
            }
            if self.pattern_match(parent, &name.to_string_lossy()) {
                self.deliver_ev_create(parent, &path, &name, notify).await;
            }
        }
    }

    /// Fd-per-watch directory rescan: deliver CREATE for entries newer
    /// than the last observed ctime or not yet in the store.
    pub(crate) async fn check_created(&mut self, id: WatchpointId) {
        let Some(wp) = self.store.get(id) else {
            return;
        };
        let path = wp.dirname.clone();
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(error) => {
                error!("cannot open directory {}: {}", path.display(), error);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !self.pattern_match(id, &name.to_string_lossy()) {
                continue;
            }
            let full = mkfilename(&path, &name);
            let md = match fs::metadata(&full) {
                Ok(md) => md,
                Err(error) => {
                    error!("cannot stat {}: {}", full.display(), error);
                    continue;
                }
            };
            let ctime = md.ctime();
            let last = self.store.get(id).map(|wp| wp.file_ctime).unwrap_or(0);
            if ctime > last || self.store.lookup(&full).is_none() {
                self.deliver_ev_create(id, &path, &name, true).await;
                if let Some(wp) = self.store.get_mut(id) {
                    wp.file_ctime = ctime;
                }
            }
        }
    }

    /// The watched path disappeared. A top-level watchpoint leaves a
    /// sentinel on its parent; the daemon stops when nothing is left.
    pub(crate) fn suspend(&mut self, id: WatchpointId) {
        let Some(wp) = self.store.get(id) else {
            return;
        };
        if wp.parent.is_none() {
            if let Err(error) = self.install_sentinel(id) {
                error!(%error, "cannot install sentinel");
            }
        }
        self.destroy(id);
        if self.store.path_count() == 0 {
            error!("no watchers left; exiting now");
            self.stop = true;
        }
    }

    pub(crate) fn destroy(&mut self, id: WatchpointId) {
        let Some(wp) = self.store.get(id) else {
            return;
        };
        debug!("removing watcher {}", wp.dirname.display());
        let path = wp.dirname.clone();
        self.store.recent_deinit(id);
        if let Some(wd) = self.store.get(id).and_then(|wp| wp.wd) {
            self.backend.remove_watch(wd, &path);
            self.store.clear_wd(id);
        }
        self.store.remove_path(id);
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
