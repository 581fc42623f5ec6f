// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: backend wiring, startup scan, PID file.

use std::io;
use std::path::Path;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use direvent_adapters::{SysBackend, EVENT_CHANNEL_CAPACITY, SYS_PROFILE};
use direvent_core::backend::RawEvent;
use direvent_engine::{Engine, EngineError};

use crate::config::{ConfigError, ConfigFile};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("cannot initialize event backend: {0}")]
    Backend(#[from] io::Error),
}

/// The running engine plus the channel its backend delivers batches on.
pub struct StartupResult {
    pub engine: Engine<SysBackend>,
    pub events: mpsc::Receiver<Vec<RawEvent>>,
}

/// Wire the native backend, register every configured watcher and run
/// the initial scan.
pub async fn startup(config: &ConfigFile) -> Result<StartupResult, StartupError> {
    let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let backend = SysBackend::init(tx)?;
    let mut engine = Engine::new(backend, config.global_envop()?);

    for block in &config.watchers {
        let (path, depth, handler) = block.build(&SYS_PROFILE)?;
        engine.register(&path, depth, handler);
    }
    engine.setup().await?;
    Ok(StartupResult { engine, events })
}

/// Store the daemon's PID, decimal followed by a newline.
pub fn write_pidfile(path: &Path) -> io::Result<()> {
    std::fs::write(path, format!("{}\n", std::process::id()))
}

pub fn remove_pidfile(path: &Path) {
    if let Err(error) = std::fs::remove_file(path) {
        if error.kind() != io::ErrorKind::NotFound {
            warn!("cannot remove pidfile {}: {}", path.display(), error);
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
