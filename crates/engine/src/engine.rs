// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine: registry, backend and process table behind one handle.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use direvent_core::backend::{Backend, BackendProfile};
use direvent_core::EnvopProgram;

use crate::error::EngineError;
use crate::handler::Handler;
use crate::process::ProcessTable;
use crate::store::{Registry, WatchpointId};

pub struct Engine<B: Backend> {
    pub(crate) backend: B,
    pub(crate) store: Registry,
    pub(crate) procs: ProcessTable,
    pub(crate) global_envop: EnvopProgram,
    pub(crate) stop: bool,
    pub(crate) exit_code: i32,
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: B, global_envop: EnvopProgram) -> Self {
        Self {
            backend,
            store: Registry::new(),
            procs: ProcessTable::new(),
            global_envop,
            stop: false,
            exit_code: 0,
        }
    }

    pub fn profile(&self) -> &'static BackendProfile {
        self.backend.profile()
    }

    pub fn store(&self) -> &Registry {
        &self.store
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.procs
    }

    /// Whether the loop should end.
    pub fn stopped(&self) -> bool {
        self.stop
    }

    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    /// Exit status for the daemon: 0 unless a self-test decided
    /// otherwise.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Register a configured watchpoint with one handler. Repeated paths
    /// accumulate handlers and keep the deepest recursion.
    pub fn register(&mut self, path: &Path, depth: u32, handler: Handler) -> WatchpointId {
        let (id, _created) = self.store.install(path);
        if let Some(wp) = self.store.get_mut(id) {
            wp.depth = wp.depth.max(depth);
            wp.handlers.append_cow(Arc::new(handler));
        }
        id
    }

    /// Initialize every configured watchpoint and scan its subtree
    /// without notification. Paths that fail to install are logged and
    /// skipped; it is fatal only when nothing could be installed.
    pub async fn setup(&mut self) -> Result<(), EngineError> {
        let ids = self.store.ids();
        if ids.is_empty() {
            return Err(EngineError::NoHandlers);
        }
        let subtree = self.backend.profile().watch_regular_files;
        for &id in &ids {
            let wants_sentinel = self
                .store
                .get(id)
                .map(|wp| (subtree || wp.depth > 0) && !wp.handlers.contains_directory_sentinel())
                .unwrap_or(false);
            if wants_sentinel {
                self.attach_directory_sentinel(id);
            }
        }
        for id in ids {
            let uninstalled = self.store.get(id).map(|wp| wp.wd.is_none()).unwrap_or(false);
            if uninstalled && self.watchpoint_init(id).is_ok() {
                self.watch_subdirs(id, false).await;
            }
        }
        if !self.store.any_installed() {
            return Err(EngineError::NoWatchers);
        }
        Ok(())
    }

    /// Remove every backend registration for graceful teardown.
    pub fn shutdown(&mut self) {
        for id in self.store.ids() {
            let Some(wp) = self.store.get(id) else { continue };
            let Some(wd) = wp.wd else { continue };
            let path = wp.dirname.clone();
            debug!("removing watcher {}", path.display());
            self.backend.remove_watch(wd, &path);
            self.store.clear_wd(id);
        }
        info!("watchers shut down");
    }

    /// Loop epilogue: timeout kills, reaping, recent-cache expiry, then
    /// the GC pass for watchpoints queued during dispatch.
    pub fn maintenance(&mut self) {
        self.procs.timeouts();
        self.process_cleanup(false);
        self.store.recent_cleanup(Instant::now());
        self.watchpoint_gc();
    }

    /// Reap exited children; a finished self-test sets the exit code and
    /// stops the loop.
    pub fn process_cleanup(&mut self, expect_term: bool) {
        if let Some(code) = self.procs.cleanup(expect_term) {
            self.exit_code = code;
            self.stop = true;
        }
    }

    /// Destroy watchpoints queued for deferred teardown.
    pub fn watchpoint_gc(&mut self) {
        for id in self.store.take_gc() {
            self.destroy(id);
        }
    }
}
