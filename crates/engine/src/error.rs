// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the watcher runtime

use std::io;
use std::path::PathBuf;

use direvent_core::WordSplitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no event handlers configured")]
    NoHandlers,
    #[error("no watchers could be installed")]
    NoWatchers,
    #[error("cannot set watcher on {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot run `{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot split `{command}': {source}")]
    Split {
        command: String,
        #[source]
        source: WordSplitError,
    },
    #[error("environment setup failed: {0}")]
    Environment(#[from] WordSplitError),
    #[error("empty handler command")]
    EmptyCommand,
}
