//! # CLI Interface
//!
//! Defines the command-line argument structure for `vault-node` using
//! `clap` derive. Supports three subcommands: `demo`, `replay`, and
//! `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vault_protocol::config::DEFAULT_LOG_FILTER;

/// Custodial vault operator tool.
///
/// Runs a vault on an in-memory chain (native asset, ERC20 tokens, WETH)
/// and drives it either through the built-in demo scenario or through a
/// JSON operation script.
#[derive(Parser, Debug)]
#[command(
    name = "vault-node",
    about = "Custodial vault ledger operator tool",
    version,
    propagate_version = true
)]
pub struct VaultNodeCli {
    /// Default log filter, overridden by `RUST_LOG` when set.
    #[arg(long, global = true, env = "VAULT_LOG", default_value = DEFAULT_LOG_FILTER)]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, env = "VAULT_LOG_FORMAT", default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Log output format flag values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable output.
    Pretty,
    /// JSON lines.
    Json,
}

/// Top-level subcommands for the vault binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the built-in scenario (ETH, USDC, wrap/unwrap) and print the
    /// final ledger snapshot.
    Demo,
    /// Execute a JSON operation script against a fresh chain and vault.
    Replay(ReplayArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Path to the script: a JSON array of steps.
    pub script: PathBuf,

    /// Print Prometheus metrics for the run after the snapshot.
    #[arg(long)]
    pub metrics: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VaultNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_replay_with_global_flags() {
        let cli = VaultNodeCli::try_parse_from([
            "vault-node",
            "replay",
            "ops.json",
            "--metrics",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormatArg::Json);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.script, PathBuf::from("ops.json"));
                assert!(args.metrics);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn replay_requires_a_script() {
        assert!(VaultNodeCli::try_parse_from(["vault-node", "replay"]).is_err());
    }
}
