//! CLI command definitions for the `flowbox` binary.
//!
//! Uses clap derive macros for argument parsing. Every command that touches
//! a workflow takes the description file as its first argument.

pub mod workflow;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Wire code boxes into a graph and run them.
#[derive(Parser)]
#[command(name = "flowbox", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config.toml (defaults to `$FLOWBOX_HOME/config.toml`).
    #[arg(long, global = true, env = "FLOWBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check a workflow file for structural errors.
    Validate {
        /// Workflow description (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Print the execution order of a workflow.
    Order {
        /// Workflow description (.json, .yaml or .yml).
        file: PathBuf,
    },

    /// Run every box, then optionally rerun single boxes against cached inputs.
    Run {
        /// Workflow description (.json, .yaml or .yml).
        file: PathBuf,

        /// Box to rerun after the full run (repeatable, in order).
        #[arg(long = "box", value_name = "ID")]
        boxes: Vec<String>,
    },

    /// Start the HTTP/WebSocket API server.
    Serve {
        /// Workflow to load at startup (optional; can be posted later).
        file: Option<PathBuf>,

        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_repeated_box_flags() {
        let cli = Cli::parse_from(["flowbox", "run", "flow.yaml", "--box", "a", "--box", "b"]);
        match cli.command {
            Commands::Run { file, boxes } => {
                assert_eq!(file, PathBuf::from("flow.yaml"));
                assert_eq!(boxes, vec!["a", "b"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["flowbox", "order", "f.json", "--json", "-vv"]);
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::parse_from(["flowbox", "serve"]);
        match cli.command {
            Commands::Serve { file, port, host } => {
                assert!(file.is_none());
                assert_eq!(port, 3000);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("expected serve"),
        }
    }
}
