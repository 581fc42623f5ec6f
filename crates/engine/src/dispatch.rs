// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-event dispatch, shared by both backends.
//!
//! Backend differences are confined to the constants in
//! [`direvent_core::BackendProfile`]; in particular the synthesized
//! `CHANGE` event is composed here so the logic is tested uniformly: any
//! changed-mask bit arms a per-file flag, and a close-after-write fires
//! `CHANGE` exactly when the flag was armed.

use std::ffi::OsStr;

use tracing::{debug, info};

use direvent_core::backend::{Backend, RawEvent};
use direvent_core::event::{format_event, native_to_generic};
use direvent_core::{mkfilename, split_pathname, GENEV_CHANGE};

use crate::engine::Engine;
use crate::store::WatchpointId;

impl<B: Backend> Engine<B> {
    /// Dispatch one kernel batch in delivery order, then let the caller
    /// run the maintenance pass.
    pub async fn dispatch_batch(&mut self, batch: Vec<RawEvent>) {
        for raw in batch {
            self.dispatch_event(raw).await;
        }
    }

    pub(crate) async fn dispatch_event(&mut self, raw: RawEvent) {
        let profile = self.backend.profile();
        match raw {
            RawEvent::Overflow => {
                // Events were lost; no rescan is attempted.
                info!("event queue overflow");
            }
            RawEvent::Removed { wd } => {
                if let Some(id) = self.store.by_wd(wd) {
                    if let Some(wp) = self.store.get(id) {
                        info!("{} deleted", wp.dirname.display());
                    }
                    self.suspend(id);
                }
            }
            RawEvent::Notify { wd, mask, name } => {
                let Some(id) = self.store.by_wd(wd) else {
                    info!("watcher not found: {}", wd);
                    return;
                };

                if let Some(name) = &name {
                    if mask & profile.create_native != 0 {
                        if let Some(wp) = self.store.get(id) {
                            debug!(
                                "{}/{} created",
                                wp.dirname.display(),
                                name.to_string_lossy()
                            );
                        }
                        if self.store.recent_seen(id, name) {
                            if let Some(wp) = self.store.get(id) {
                                info!(
                                    "{}/{}: ignoring CREATE event: already delivered",
                                    wp.dirname.display(),
                                    name.to_string_lossy()
                                );
                            }
                            return;
                        }
                    }
                }

                let mut event = native_to_generic(mask, profile.xlat);

                // CHANGE synthesis: arm on a changed-mask bit, fire on
                // close-after-write iff armed.
                if mask & profile.changed_mask != 0 {
                    if let Some(wp) = self.store.get_mut(id) {
                        match &name {
                            Some(n) => {
                                wp.files_changed.insert(n.clone());
                            }
                            None => wp.file_changed = true,
                        }
                    }
                }
                if mask & profile.close_write != 0 {
                    let was_changed = match self.store.get_mut(id) {
                        Some(wp) => match &name {
                            Some(n) => wp.files_changed.remove(n.as_os_str()),
                            None => std::mem::take(&mut wp.file_changed),
                        },
                        None => false,
                    };
                    if was_changed {
                        event.generic |= GENEV_CHANGE;
                    }
                }

                if tracing::enabled!(tracing::Level::DEBUG) {
                    if let Some(wp) = self.store.get(id) {
                        let (gen, sys) = format_event(&event, &profile.transtab);
                        debug!("{}: system events: {}", wp.dirname.display(), sys);
                        debug!("{}: generic events: {}", wp.dirname.display(), gen);
                    }
                }

                match name {
                    Some(name) => self.dispatch_child_event(id, mask, &name, &event).await,
                    None => self.dispatch_self_event(id, mask, &event).await,
                }
            }
        }
    }

    /// An event naming a directory entry (descriptor-keyed backends).
    async fn dispatch_child_event(
        &mut self,
        id: WatchpointId,
        mask: u32,
        name: &OsStr,
        event: &direvent_core::EventMask,
    ) {
        let profile = self.backend.profile();
        let Some(wp) = self.store.get(id) else {
            return;
        };
        let dirname = wp.dirname.clone();
        self.run_handlers(id, event, &dirname, name).await;

        if mask & profile.delete_child != 0 {
            debug!("{}/{} deleted", dirname.display(), name.to_string_lossy());
            let full = mkfilename(&dirname, name);
            if let Some(child) = self.store.lookup(&full) {
                self.suspend(child);
            }
        }
    }

    /// An event on the watched location itself (always, for fd-per-watch
    /// backends).
    async fn dispatch_self_event(
        &mut self,
        id: WatchpointId,
        mask: u32,
        event: &direvent_core::EventMask,
    ) {
        let profile = self.backend.profile();
        let Some(wp) = self.store.get(id) else {
            return;
        };
        let isdir = wp.isdir;
        let dirname = wp.dirname.clone();

        if isdir {
            if mask & profile.delete_self == 0 {
                if mask & profile.rescan_mask != 0 {
                    // New entries announce themselves as directory writes.
                    self.check_created(id).await;
                } else {
                    let (_, sys) = format_event(event, &profile.transtab);
                    info!(
                        "{}: ignoring event ({}) for the watchpoint directory",
                        dirname.display(),
                        sys
                    );
                }
            }
        } else {
            let (dir, file) = split_pathname(&dirname);
            self.run_handlers(id, event, &dir, &file).await;
        }

        if mask & profile.delete_self != 0 {
            debug!("{} deleted", dirname.display());
            self.suspend(id);
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
