//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! lxc-export - export catalog for LXC containers
//!
//! Exports a container into the export store, recreates containers from
//! exports, deletes exports and lists the valid ones.

use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod engine;
mod error;

use cli::catalog::{self, Outcome, Settings};
use cli::Cli;
use engine::{Config, LxcDir};

const PROGNAME: &str = "lxc-export";

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(outcome) => {
            if cli.quiet {
                tracing::info!(summary = %outcome, "done");
            } else {
                eprintln!("{}: {}", PROGNAME, outcome);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {:#}", PROGNAME, e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    // Flag combinations are rejected before any file is opened
    let operation = cli.operation()?;

    init_logging(cli)?;

    let config = Config::load(&cli.config)?;
    let settings = Settings::new(cli, &config)?;
    tracing::debug!(?operation, ?settings, "dispatching");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    Ok(catalog::execute(&operation, &settings, &LxcDir, &mut out)?)
}

fn init_logging(cli: &Cli) -> Result<()> {
    let file = match cli.logfile.as_deref() {
        Some("none") => return Ok(()),
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?,
        ),
        None => None,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.logpriority.directive()));
    let registry = tracing_subscriber::registry().with(filter);

    match file {
        Some(file) => registry
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
            .init(),
        None => registry
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .init(),
    }
    Ok(())
}
