//! CLI argument definitions for Parley.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley -- a provider-agnostic conversational agent runtime.
#[derive(Parser)]
#[command(
    name = "parley",
    version,
    about = "Parley -- conversational agent runtime",
    long_about = "Drives the model / tool loop against a scripted model transcript, \
                  with built-in demo tools, so orchestration behaviour can be \
                  inspected without a live provider."
)]
pub struct Cli {
    /// Default log level when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scripted model transcript through the orchestrator.
    Replay {
        /// JSON file holding an array of scripted turns.
        #[arg(long, short)]
        script: PathBuf,

        /// Orchestrator configuration (TOML, or JSON by extension).
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// The user message that opens the conversation.
        #[arg(long, short, default_value = "Hello")]
        prompt: String,

        /// Optional system message placed before the prompt.
        #[arg(long)]
        system: Option<String>,

        /// Print text as it streams instead of the final result as JSON.
        #[arg(long)]
        stream: bool,

        /// Refuse calls to these tools (repeatable).
        #[arg(long = "deny", value_name = "TOOL")]
        denied: Vec<String>,
    },

    /// Load a configuration file and print the effective settings.
    CheckConfig {
        /// Configuration file (TOML, or JSON by extension).
        path: PathBuf,
    },

    /// List the built-in tools and their input schemas.
    Tools,
}
