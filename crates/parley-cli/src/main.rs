//! CLI entry point for Parley.
//!
//! This binary provides the `parley` command with subcommands for replaying
//! scripted transcripts, checking configuration files, and listing the
//! built-in tools.

mod cli;
mod helpers;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use parley_agent::{
    LoggingMiddleware, Message, Orchestrator, ToolFilterMiddleware, TurnAggregator,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Commands};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    helpers::init_tracing(&cli.log_level);

    match cli.command {
        Commands::Replay {
            script,
            config,
            prompt,
            system,
            stream,
            denied,
        } => cmd_replay(&script, config.as_deref(), prompt, system, stream, denied).await,
        Commands::CheckConfig { path } => cmd_check_config(&path),
        Commands::Tools => cmd_tools(),
    }
}

// ---------------------------------------------------------------------------
// Subcommand: replay
// ---------------------------------------------------------------------------

async fn cmd_replay(
    script: &std::path::Path,
    config: Option<&std::path::Path>,
    prompt: String,
    system: Option<String>,
    stream: bool,
    denied: Vec<String>,
) -> Result<()> {
    let config = helpers::load_config(config)?;
    let provider = Arc::new(helpers::load_script(script)?);
    let registry = helpers::builtin_tools()?;

    let mut orchestrator = Orchestrator::new(provider.clone())
        .with_config(config)
        .with_middleware(LoggingMiddleware);
    if !denied.is_empty() {
        info!(tools = ?denied, "denying tools");
        orchestrator = orchestrator.with_middleware(ToolFilterMiddleware::deny(denied));
    }

    let mut history = Vec::new();
    if let Some(system) = system {
        history.push(Message::system(system));
    }
    history.push(Message::user(prompt));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let mut units = orchestrator.run_stream(history, registry, cancel);
    let mut aggregator = TurnAggregator::new();
    let mut stdout = std::io::stdout().lock();

    while let Some(unit) = units.next().await {
        let unit = unit.context("run failed")?;
        if stream && !unit.text.is_empty() {
            write!(stdout, "{}", unit.text)?;
            stdout.flush()?;
        }
        aggregator.add(&unit);
    }

    let result = aggregator.build_final();
    info!(
        invocations = provider.invocation_count(),
        unused_turns = provider.remaining(),
        finish_reason = ?result.finish_reason,
        "replay finished"
    );

    if stream {
        writeln!(stdout)?;
    } else {
        serde_json::to_writer_pretty(&mut stdout, &result)?;
        writeln!(stdout)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(path: &std::path::Path) -> Result<()> {
    let config = helpers::load_config(Some(path))?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: tools
// ---------------------------------------------------------------------------

fn cmd_tools() -> Result<()> {
    let registry = helpers::builtin_tools()?;
    println!("{}", serde_json::to_string_pretty(&registry.definitions())?);
    Ok(())
}
