// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The child-process subsystem.
//!
//! Handler children run with a prepared environment and working
//! directory; captured stdout/stderr is forwarded line by line into the
//! log by linked reader tasks. Reaping is a non-blocking sweep over the
//! process table; timeout kills ride the daemon's maintenance tick. A
//! self-test child's termination decides the daemon's exit code.

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use direvent_core::backend::Backend;
use direvent_core::event::format_event;
use direvent_core::{Environ, EventMask, WordSplitter};

use crate::engine::Engine;
use crate::error::EngineError;
use crate::handler::ProgHandler;

/// Default handler timeout in seconds.
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Short macro names usable in environment programs and commands. They
/// are visible during environment assembly and removed before exec.
pub const MACRO_VARS: [&str; 6] = [
    "file",
    "sysev_code",
    "sysev_name",
    "genev_code",
    "genev_name",
    "self_test_pid",
];

/// Environment variables exported to handler children.
pub const CHILD_VARS: [&str; 6] = [
    "DIREVENT_FILE",
    "DIREVENT_SYSEV_CODE",
    "DIREVENT_SYSEV_NAME",
    "DIREVENT_GENEV_CODE",
    "DIREVENT_GENEV_NAME",
    "DIREVENT_SELF_TEST_PID",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Handler,
    SelfTest,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::Handler => f.write_str("handler"),
            ProcessKind::SelfTest => f.write_str("self-test"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ProcessRecord {
    kind: ProcessKind,
    pid: u32,
    child: Child,
    started: Instant,
    timeout: Duration,
    killed: bool,
    /// Logger tasks draining captured stdout/stderr; they end on EOF.
    #[allow(dead_code)]
    loggers: Vec<JoinHandle<()>>,
}

#[derive(Debug, Default)]
pub struct ProcessTable {
    active: Vec<ProcessRecord>,
    self_test: Option<ProcessRecord>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.active.iter().any(|rec| rec.pid == pid)
    }

    pub fn self_test_pid(&self) -> Option<u32> {
        self.self_test.as_ref().map(|rec| rec.pid)
    }

    pub(crate) fn register(&mut self, record: ProcessRecord) {
        match record.kind {
            ProcessKind::SelfTest => self.self_test = Some(record),
            ProcessKind::Handler => self.active.push(record),
        }
    }

    /// Reap exited children without blocking. Returns the daemon exit
    /// code when the self-test child finished: its exit status when it
    /// exited, 0 when SIGHUP terminated it, 2 otherwise.
    pub fn cleanup(&mut self, expect_term: bool) -> Option<i32> {
        let mut exit = None;
        if let Some(st) = self.self_test.as_mut() {
            match st.child.try_wait() {
                Ok(Some(status)) => {
                    log_status(st.pid, ProcessKind::SelfTest, &status, &[Signal::SIGHUP]);
                    exit = Some(self_test_code(&status));
                    self.self_test = None;
                }
                Ok(None) => {}
                Err(error) => {
                    error!(%error, "cannot wait for self-test child");
                    self.self_test = None;
                    exit = Some(2);
                }
            }
        }

        let mut i = 0;
        while i < self.active.len() {
            match self.active[i].child.try_wait() {
                Ok(Some(status)) => {
                    let rec = self.active.remove(i);
                    let mut expected = Vec::new();
                    if expect_term {
                        expected.push(Signal::SIGTERM);
                    }
                    if rec.killed {
                        expected.push(Signal::SIGKILL);
                    }
                    log_status(rec.pid, rec.kind, &status, &expected);
                }
                Ok(None) => i += 1,
                Err(error) => {
                    error!(pid = self.active[i].pid, %error, "cannot wait for child");
                    i += 1;
                }
            }
        }
        exit
    }

    /// Kill handler children whose age exceeds their timeout. The next
    /// cleanup sweep reaps them.
    pub fn timeouts(&mut self) {
        let now = Instant::now();
        for rec in &mut self.active {
            if !rec.killed && now.duration_since(rec.started) >= rec.timeout {
                error!("process {} timed out", rec.pid);
                if let Err(error) = rec.child.start_kill() {
                    error!(pid = rec.pid, %error, "cannot kill timed-out process");
                }
                rec.killed = true;
            }
        }
    }
}

fn self_test_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if status.signal() == Some(Signal::SIGHUP as i32) {
        0
    } else {
        2
    }
}

fn log_status(pid: u32, kind: ProcessKind, status: &ExitStatus, expected: &[Signal]) {
    if let Some(code) = status.code() {
        if code == 0 {
            debug!("process {pid} ({kind}) exited successfully");
        } else {
            error!("process {pid} ({kind}) failed with status {code}");
        }
    } else if let Some(sig) = status.signal() {
        let core = if status.core_dumped() {
            " (dumped core)"
        } else {
            ""
        };
        if expected.iter().any(|s| *s as i32 == sig) {
            debug!("process {pid} ({kind}) terminated on signal {sig}{core}");
        } else {
            error!("process {pid} ({kind}) terminated on signal {sig}{core}");
        }
    } else if let Some(sig) = status.stopped_signal() {
        error!("process {pid} ({kind}) stopped on signal {sig}");
    } else {
        error!("process {pid} ({kind}) terminated with unrecognized status");
    }
}

fn spawn_logger<R>(stream: R, command: String, to_stderr: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if to_stderr {
                error!(handler = %command, "{}", line);
            } else {
                info!(handler = %command, "{}", line);
            }
        }
    })
}

impl<B: Backend> Engine<B> {
    /// Launch a handler command for an event. Without the nowait flag,
    /// dispatch sleeps a second at a time until the child exits or twice
    /// its timeout has passed.
    pub(crate) async fn run_prog_handler(
        &mut self,
        prog: &ProgHandler,
        event: &EventMask,
        dirname: &Path,
        filename: &OsStr,
    ) -> Result<(), EngineError> {
        debug!(
            "starting {}, dir={}, file={}",
            prog.command,
            dirname.display(),
            filename.to_string_lossy()
        );

        // Macro names stay visible through the argv split and are removed
        // from the exported environment below.
        let mut env = self.child_environ(prog, event, filename)?;
        let argv = if prog.flags.shell {
            let shell = env.get("SHELL").unwrap_or("/bin/sh").to_string();
            vec![shell, "-c".to_string(), prog.command.clone()]
        } else {
            WordSplitter::new(&env)
                .keep_undef(true)
                .split(&prog.command)
                .map_err(|source| EngineError::Split {
                    command: prog.command.clone(),
                    source,
                })?
        };
        let Some((program, args)) = argv.split_first() else {
            return Err(EngineError::EmptyCommand);
        };
        for name in MACRO_VARS {
            env.unset(name, None);
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(env.iter())
            .current_dir(dirname)
            .stdin(Stdio::null())
            .stdout(if prog.flags.capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if prog.flags.capture_stderr {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(uid) = prog.uid {
            if uid != 0 && uid != nix::unistd::Uid::current().as_raw() {
                cmd.uid(uid);
                if let Some(gid) = prog.gids.first() {
                    cmd.gid(*gid);
                }
            }
        }

        let mut child = cmd.spawn().map_err(|source| {
            error!("cannot run `{}': {}", prog.command, source);
            EngineError::Spawn {
                command: prog.command.clone(),
                source,
            }
        })?;
        let pid = child.id().unwrap_or_default();
        debug!(
            "{} running; dir={}, file={}, pid={}",
            prog.command,
            dirname.display(),
            filename.to_string_lossy(),
            pid
        );

        let mut loggers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            loggers.push(spawn_logger(stdout, prog.command.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            loggers.push(spawn_logger(stderr, prog.command.clone(), true));
        }

        self.procs.register(ProcessRecord {
            kind: ProcessKind::Handler,
            pid,
            child,
            started: Instant::now(),
            timeout: prog.timeout,
            killed: false,
            loggers,
        });

        if prog.flags.nowait {
            return Ok(());
        }

        debug!("waiting for {} ({}) to terminate", prog.command, pid);
        let began = Instant::now();
        let give_up = prog.timeout.saturating_mul(2);
        while began.elapsed() < give_up {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.procs.timeouts();
            self.process_cleanup(true);
            if !self.procs.is_running(pid) {
                break;
            }
        }
        Ok(())
    }

    /// Assemble a child environment: the daemon's environment plus the
    /// default variables, filtered through the global and per-handler
    /// environment programs.
    fn child_environ(
        &self,
        prog: &ProgHandler,
        event: &EventMask,
        filename: &OsStr,
    ) -> Result<Environ, EngineError> {
        let mut env = Environ::from_host();
        let profile = self.backend.profile();
        let (genev_name, sysev_name) = format_event(event, &profile.transtab);

        let defaults = [
            ("file", "DIREVENT_FILE", filename.to_string_lossy().into_owned()),
            ("sysev_code", "DIREVENT_SYSEV_CODE", event.native.to_string()),
            ("sysev_name", "DIREVENT_SYSEV_NAME", sysev_name),
            ("genev_code", "DIREVENT_GENEV_CODE", event.generic.to_string()),
            ("genev_name", "DIREVENT_GENEV_NAME", genev_name),
        ];
        for (macro_name, envar, value) in &defaults {
            env.insert(envar, value);
            env.insert(macro_name, value);
        }
        if let Some(pid) = self.procs.self_test_pid() {
            let value = pid.to_string();
            env.insert("DIREVENT_SELF_TEST_PID", &value);
            env.insert("self_test_pid", &value);
        }

        self.global_envop
            .exec(&mut env)
            .map_err(EngineError::Environment)?;
        prog.envop.exec(&mut env).map_err(EngineError::Environment)?;
        Ok(env)
    }

    /// Spawn the self-test child through `/bin/sh -c`. Its termination
    /// stops the daemon with the propagated status.
    pub fn start_self_test(&mut self, command: &str) -> Result<(), EngineError> {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command).stdin(Stdio::null());
        let child = cmd.spawn().map_err(|source| {
            error!("cannot run `{}': fork failed: {}", command, source);
            EngineError::Spawn {
                command: command.to_string(),
                source,
            }
        })?;
        let pid = child.id().unwrap_or_default();
        info!("self-test started, pid={}", pid);
        self.procs.register(ProcessRecord {
            kind: ProcessKind::SelfTest,
            pid,
            child,
            started: Instant::now(),
            timeout: Duration::MAX,
            killed: false,
            loggers: Vec::new(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
