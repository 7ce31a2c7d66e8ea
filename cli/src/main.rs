// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # PackGuard CLI
//!
//! Operator front end for the PackGuard core. It runs the same service a game
//! client embeds, so decisions, sandbox downloads and remapped paths can be
//! checked from a shell.
//!
//! ## Commands
//!
//! - `packguard evaluate` - Evaluate one pack request and apply the decision
//! - `packguard remap` - Show where an isolated download would be stored
//! - `packguard config show|validate|generate` - Configuration management
//! - `packguard cache clear|sandbox` - Server-pack cache and sandbox housekeeping

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use packguard_cli::commands::{self, CacheCommand, ConfigCommand, EvaluateArgs, RemapArgs};

/// PackGuard - keep servers from fingerprinting clients through pack requests
#[derive(Parser)]
#[command(name = "packguard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "PACKGUARD_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "PACKGUARD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a pack request
    #[command(name = "evaluate")]
    Evaluate(EvaluateArgs),

    /// Resolve an isolated download path
    #[command(name = "remap")]
    Remap(RemapArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Pack cache housekeeping
    #[command(name = "cache")]
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Evaluate(args)) => commands::evaluate::handle_command(args, cli.config).await,
        Some(Commands::Remap(args)) => commands::remap::handle_command(args, cli.config).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Cache { command }) => {
            commands::cache::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
