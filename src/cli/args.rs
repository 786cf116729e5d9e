//! CLI argument definitions using clap
//!
//! Commands:
//! - regatta-replication apply --snapshot <file> --ops <jsonl> [--config <path>]
//! - regatta-replication inspect --snapshot <file>
//! - regatta-replication transform --client <json> --server <json>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Offline tooling for racing event service replication
#[derive(Parser, Debug)]
#[command(name = "regatta-replication")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Also log informational replication events
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply an operation log on a master and write its initial load
    Apply {
        /// Initial load to start from (if present) and to write back
        #[arg(long)]
        snapshot: PathBuf,

        /// One JSON-encoded operation per line
        #[arg(long)]
        ops: PathBuf,

        /// Replication configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the contents of an initial load
    Inspect {
        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Transform a client operation against a concurrent server operation
    Transform {
        /// Operation applied first on the replica
        #[arg(long)]
        client: String,

        /// Operation applied first on the master
        #[arg(long)]
        server: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_arguments() {
        let cli = Cli::parse_from([
            "regatta-replication",
            "apply",
            "--snapshot",
            "kw.load",
            "--ops",
            "kw.jsonl",
        ]);
        assert!(!cli.verbose);
        match cli.command {
            Command::Apply {
                snapshot,
                ops,
                config,
            } => {
                assert_eq!(snapshot, PathBuf::from("kw.load"));
                assert_eq!(ops, PathBuf::from("kw.jsonl"));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_transform_requires_both_operations() {
        assert!(Cli::try_parse_from(["regatta-replication", "transform", "--client", "{}"]).is_err());
    }
}
