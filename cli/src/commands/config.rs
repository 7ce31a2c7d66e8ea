// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use packguard_core::domain::config::GuardConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./packguard-config.yaml)
        #[arg(short, long, default_value = "./packguard-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let manifest = GuardConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;
    let config = &manifest.spec;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. PACKGUARD_CONFIG_PATH: {}",
            std::env::var("PACKGUARD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./packguard-config.yaml");
        println!("  4. ~/.packguard/config.yaml");
        println!("  5. /etc/packguard/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", manifest.metadata.name);
    println!();

    println!("{}", "Policy:".bold());
    println!("  Mode: {:?}", config.policy);
    if config.whitelist.is_empty() {
        println!("  Whitelist: {}", "(none)".dimmed());
    } else {
        println!("  Whitelist:");
        for host in &config.whitelist {
            println!("    - {}", host);
        }
    }
    println!("  Toast level: {}", config.toast_level);
    println!();

    println!("{}", "Protection:".bold());
    println!("  Cache isolation: {}", config.cache_isolation);
    println!("  Clear cache on start: {}", config.clear_cache_on_start);
    println!("  Extract after sandbox: {}", config.extract_after_sandbox);
    println!(
        "  Fingerprinting: {} requests / {} ms (chat alert: {})",
        config.fingerprint_threshold, config.fingerprint_window_ms, config.fingerprint_chat_alert
    );
    println!();

    println!("{}", "Paths:".bold());
    println!("  Sandbox: {}", config.sandbox_dir().display());
    if config.audit_log {
        println!("  Audit log: {}", config.audit_log_path().display());
    } else {
        println!("  Audit log: {}", "(disabled)".dimmed());
    }
    match config.server_cache_dir() {
        Some(dir) => println!("  Server pack cache: {}", dir.display()),
        None => println!("  Server pack cache: {}", "(not configured)".dimmed()),
    }
    println!();

    println!("{}", "Downloads:".bold());
    println!(
        "  Timeouts: connect {} ms, request {} ms",
        config.download.connect_timeout_ms, config.download.request_timeout_ms
    );
    println!("  Max redirects: {}", config.download.max_redirects);
    println!(
        "  Cached pack poll: every {} ms for up to {} ms",
        config.download.poll_interval_ms, config.download.poll_deadline_ms
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GuardConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
