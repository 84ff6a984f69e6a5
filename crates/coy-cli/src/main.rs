//! COY CLI - relationship gating and timeline tooling
//!
//! Evaluates the relationship table and replays scripted conversations
//! against the in-memory stores.

mod cli;
mod commands;
mod error;


use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_config;
use crate::commands::intent::run_intent;
use crate::commands::replay::run_replay;
use crate::commands::resolve::run_resolve;
use crate::commands::table::run_table;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coy=info,coy_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Table { json } => run_table(json)?,
        Commands::Resolve {
            mine,
            theirs,
            known_friends,
            blocked,
            json,
        } => run_resolve(&mine, &theirs, known_friends, blocked, json)?,
        Commands::Intent { mine, theirs, json } => run_intent(&mine, &theirs, json)?,
        Commands::Replay {
            script,
            format,
            output,
            export_dir,
        } => {
            let config = resolve_config(cli.config.as_deref())?;
            run_replay(
                &script,
                format,
                output.as_deref(),
                export_dir.as_deref(),
                &config,
            )
            .await?;
        }
    }

    Ok(())
}
