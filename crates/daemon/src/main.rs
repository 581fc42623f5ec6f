// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! direventd - directory content watcher daemon
//!
//! Watches configured filesystem locations, translates kernel change
//! notifications into a portable event vocabulary and launches external
//! commands for matching events. One loop drives everything: dispatch a
//! backend batch, then run the maintenance pass.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use direvent_daemon::config::ConfigFile;
use direvent_daemon::lifecycle::{self, StartupResult};
use direvent_engine::EngineError;

const DEFAULT_CONFFILE: &str = "/etc/direvent.toml";

#[derive(Parser)]
#[command(
    name = "direventd",
    version,
    about = "directory content watcher daemon"
)]
struct Cli {
    /// Configuration file
    #[arg(value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase debug verbosity
    #[arg(short = 'd', long = "debug", action = ArgAction::Count)]
    debug: u8,

    /// Remain in the foreground (the daemon never detaches; accepted for
    /// compatibility with supervisor setups)
    #[arg(short = 'f', long)]
    foreground: bool,

    /// Store the daemon PID in this file
    #[arg(short = 'P', long, value_name = "FILE")]
    pidfile: Option<PathBuf>,

    /// Run a self-test command; the daemon exits with its status
    #[arg(short = 'T', long = "self-test", value_name = "COMMAND")]
    self_test: Option<String>,

    /// Check the configuration and exit
    #[arg(long)]
    lint: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFFILE));
    let config = match ConfigFile::load(&config_path) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("direventd: {error}");
            return ExitCode::FAILURE;
        }
    };
    if cli.lint {
        return ExitCode::SUCCESS;
    }

    setup_logging(config.debug.saturating_add(cli.debug));

    if config.watchers.is_empty() {
        error!("no event handlers configured");
        return ExitCode::FAILURE;
    }

    let StartupResult {
        mut engine,
        mut events,
    } = match lifecycle::startup(&config).await {
        Ok(result) => result,
        Err(error) => {
            error!("{error}");
            let code = match error {
                lifecycle::StartupError::Engine(
                    EngineError::NoWatchers | EngineError::NoHandlers,
                ) => 2,
                _ => 1,
            };
            return ExitCode::from(code);
        }
    };

    info!("direventd {} started", env!("CARGO_PKG_VERSION"));

    let pidfile = cli.pidfile.clone().or_else(|| config.pidfile.clone());
    if let Some(path) = &pidfile {
        if let Err(error) = lifecycle::write_pidfile(path) {
            error!(
                "cannot open pidfile {} for writing: {}",
                path.display(),
                error
            );
        }
    }

    if let Some(command) = &cli.self_test {
        if engine.start_self_test(command).is_err() {
            return ExitCode::from(2);
        }
    }

    let mut signals = match StopSignals::install() {
        Ok(signals) => signals,
        Err(error) => {
            error!("cannot install signal handlers: {error}");
            return ExitCode::FAILURE;
        }
    };

    // Engine loop: one event-wait step, then timeouts, reaping and GC.
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            batch = events.recv() => match batch {
                Some(batch) => engine.dispatch_batch(batch).await,
                None => {
                    error!("event backend stopped");
                    engine.request_stop();
                }
            },
            name = signals.stopped() => {
                info!("got signal {name}");
                engine.request_stop();
            }
            _ = tick.tick() => {}
        }
        engine.maintenance();
        if engine.stopped() {
            break;
        }
    }

    engine.shutdown();
    if let Some(path) = &pidfile {
        lifecycle::remove_pidfile(path);
    }
    info!("direventd stopped");

    ExitCode::from(u8::try_from(engine.exit_code()).unwrap_or(2))
}

struct StopSignals {
    term: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
    hup: tokio::signal::unix::Signal,
    usr1: tokio::signal::unix::Signal,
}

impl StopSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
            usr1: signal(SignalKind::user_defined1())?,
        })
    }

    /// Resolves with the signal's name when any stop signal arrives.
    async fn stopped(&mut self) -> &'static str {
        tokio::select! {
            _ = self.term.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
            _ = self.int.recv() => "SIGINT",
            _ = self.hup.recv() => "SIGHUP",
            _ = self.usr1.recv() => "SIGUSR1",
        }
    }
}

fn setup_logging(debug_level: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match debug_level {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
