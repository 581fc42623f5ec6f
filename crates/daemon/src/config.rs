// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! A TOML file with global settings and one `[[watcher]]` block per
//! watched location:
//!
//! ```toml
//! debug = 1
//! pidfile = "/run/direventd.pid"
//!
//! [[watcher]]
//! path = "/var/spool/incoming"
//! recursive = 2
//! events = ["create", "change"]
//! files = ["*.upload", "!*.tmp"]
//! command = "process-upload $file"
//! user = "daemon"
//! timeout = 10
//! option = ["nowait", "stdout"]
//! environ = ["-", "PATH", "UPLOAD_DIR=${file}"]
//! ```

use std::ffi::CString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use direvent_core::backend::BackendProfile;
use direvent_core::envop::EnvopError;
use direvent_core::event::getevt;
use direvent_core::pattern::PatternError;
use direvent_core::{EnvopProgram, EventMask, PatternList, GENEV_TRANSTAB};
use direvent_engine::{
    Handler, HandlerFlags, ProgHandler, CHILD_VARS, DEFAULT_TIMEOUT, MACRO_VARS,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("unknown handler option: {0}")]
    UnknownOption(String),
    #[error("no such user: {0}")]
    UnknownUser(String),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Envop(#[from] EnvopError),
}

/// Recursion control for a watcher: a switch or an explicit depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Recurse {
    Enabled(bool),
    Depth(u32),
}

impl Default for Recurse {
    fn default() -> Self {
        Recurse::Enabled(false)
    }
}

impl Recurse {
    pub fn depth(self) -> u32 {
        match self {
            Recurse::Enabled(false) => 0,
            Recurse::Enabled(true) => u32::MAX,
            Recurse::Depth(depth) => depth,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Extra debug verbosity, added to the command line's.
    #[serde(default)]
    pub debug: u8,
    pub pidfile: Option<PathBuf>,
    #[serde(default)]
    pub foreground: bool,
    /// Global environment program applied before each handler's own.
    #[serde(default)]
    pub environ: Vec<String>,
    #[serde(default, rename = "watcher")]
    pub watchers: Vec<WatcherBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherBlock {
    pub path: PathBuf,
    #[serde(default)]
    pub recursive: Recurse,
    /// Event names, generic or native. Empty means every generic event.
    #[serde(default)]
    pub events: Vec<String>,
    /// Filename patterns: glob by default, `/…/` for regex, `!` negates.
    #[serde(default)]
    pub files: Vec<String>,
    pub command: String,
    pub user: Option<String>,
    /// Handler timeout in seconds.
    pub timeout: Option<u64>,
    /// `nowait`, `wait`, `stdout`, `stderr`, `shell`.
    #[serde(default)]
    pub option: Vec<String>,
    /// Per-handler environment program (legacy string syntax).
    #[serde(default)]
    pub environ: Vec<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    pub fn global_envop(&self) -> Result<EnvopProgram, ConfigError> {
        Ok(EnvopProgram::parse_legacy(
            &self.environ,
            &MACRO_VARS,
            &CHILD_VARS,
        )?)
    }
}

impl WatcherBlock {
    /// Resolve the block into its absolute path, recursion depth and
    /// handler.
    pub fn build(&self, profile: &BackendProfile) -> Result<(PathBuf, u32, Handler), ConfigError> {
        let path = std::path::absolute(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        let mut mask = EventMask::EMPTY;
        for name in &self.events {
            let ev = getevt(name, &profile.transtab)
                .ok_or_else(|| ConfigError::UnknownEvent(name.clone()))?;
            mask = mask.or(&ev);
        }
        if mask.is_empty() {
            mask.generic = GENEV_TRANSTAB.full_mask();
        }

        let mut patterns = PatternList::new();
        for spec in &self.files {
            patterns.add_spec(spec)?;
        }

        let mut flags = HandlerFlags::default();
        for option in &self.option {
            match option.as_str() {
                "nowait" => flags.nowait = true,
                "wait" => flags.nowait = false,
                "stdout" => flags.capture_stdout = true,
                "stderr" => flags.capture_stderr = true,
                "shell" => flags.shell = true,
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
        }

        let (uid, gids) = match &self.user {
            Some(name) => {
                let (uid, gids) = resolve_user(name)?;
                (Some(uid), gids)
            }
            None => (None, Vec::new()),
        };

        let prog = ProgHandler {
            command: self.command.clone(),
            flags,
            uid,
            gids,
            timeout: Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT)),
            envop: EnvopProgram::parse_legacy(&self.environ, &MACRO_VARS, &CHILD_VARS)?,
        };
        Ok((
            path,
            self.recursive.depth(),
            Handler::program(mask, patterns, prog),
        ))
    }
}

/// Resolve a user name to its uid and group list, primary group first.
fn resolve_user(name: &str) -> Result<(u32, Vec<u32>), ConfigError> {
    let unknown = || ConfigError::UnknownUser(name.to_string());
    let user = nix::unistd::User::from_name(name)
        .map_err(|_| unknown())?
        .ok_or_else(unknown)?;
    let cname = CString::new(name).map_err(|_| unknown())?;
    let mut gids = vec![user.gid.as_raw()];
    if let Ok(groups) = nix::unistd::getgrouplist(&cname, user.gid) {
        for gid in groups {
            if !gids.contains(&gid.as_raw()) {
                gids.push(gid.as_raw());
            }
        }
    }
    Ok((user.uid.as_raw(), gids))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
