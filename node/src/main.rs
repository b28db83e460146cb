// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vault Operator CLI
//!
//! Entry point for the `vault-node` binary. Parses CLI arguments,
//! initializes logging, and runs a vault on an in-memory chain.
//!
//! The binary supports three subcommands:
//!
//! - `demo`: run the built-in scenario and print the final snapshot
//! - `replay`: execute a JSON operation script
//! - `version`: print build version information

mod cli;
mod demo;
mod logging;
mod metrics;
mod replay;

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Commands, VaultNodeCli};
use metrics::VaultMetrics;
use replay::{Replay, ReplaySummary, Step};

fn main() -> Result<()> {
    let cli = VaultNodeCli::parse();

    match cli.command {
        Commands::Demo => {
            logging::init_logging(&cli.log_level, cli.log_format.into());
            run_script(&demo::script(), false)
        }
        Commands::Replay(args) => {
            logging::init_logging(&cli.log_level, cli.log_format.into());
            tracing::info!(script = %args.script.display(), "loading script");
            let steps = replay::load_script(&args.script)?;
            run_script(&steps, args.metrics)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs `steps` on a fresh chain, then prints the summary, the ledger
/// snapshot, and optionally the metrics.
fn run_script(steps: &[Step], with_metrics: bool) -> Result<()> {
    let metrics = VaultMetrics::new().context("failed to register metrics")?;
    let mut replay = Replay::new()?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let summary = replay.run(steps, &metrics, &mut out)?;
    print_summary(&mut out, &summary)?;

    let snapshot =
        serde_json::to_string_pretty(&replay.snapshot()).context("failed to encode snapshot")?;
    writeln!(out, "{snapshot}")?;

    if with_metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        write!(out, "{text}")?;
    }
    Ok(())
}

fn print_summary(out: &mut impl Write, summary: &ReplaySummary) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "Run {}", summary.run_id)?;
    writeln!(out, "  Steps     : {}", summary.steps)?;
    writeln!(out, "  Succeeded : {}", summary.succeeded)?;
    writeln!(out, "  Failed    : {}", summary.failed)?;
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("vault-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
