// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cache housekeeping commands
//!
//! Commands: clear, sandbox

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use packguard_core::infrastructure::pack_cache::clear_server_pack_cache;

use super::load_config;

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Remove every pack from the engine's server-pack cache
    Clear {
        /// Server-pack cache directory (default: <resourcepacks_dir>/server)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// List sandboxed packs
    Sandbox,
}

pub async fn handle_command(command: CacheCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    match command {
        CacheCommand::Clear { dir } => {
            let dir = dir.or_else(|| config.server_cache_dir()).context(
                "No cache directory: pass --dir or set spec.resourcepacks_dir in the configuration",
            )?;
            clear(&dir)
        }
        CacheCommand::Sandbox => list_sandbox(&config.sandbox_dir()),
    }
}

fn clear(dir: &Path) -> Result<()> {
    let removed = clear_server_pack_cache(dir)
        .with_context(|| format!("Failed to clear {}", dir.display()))?;
    println!(
        "{}",
        format!("✓ Removed {} cached server pack(s) from {}", removed, dir.display()).green()
    );
    Ok(())
}

fn list_sandbox(dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("{}", format!("No sandbox directory at {}", dir.display()).dimmed());
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", dir.display())),
    };

    let mut names = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let suffix = if entry.path().is_dir() { "/" } else { "" };
            format!("{}{}", entry.file_name().to_string_lossy(), suffix)
        })
        .collect::<Vec<_>>();
    names.sort();

    println!("{}", format!("Sandbox: {}", dir.display()).bold());
    for name in &names {
        println!("  {}", name);
    }
    if names.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("packguard-config.yaml");
        let yaml = format!(
            "apiVersion: packguard.dev/v1\nkind: PackGuardConfig\nmetadata:\n  name: cli-test\nspec:\n  root_dir: {:?}\n  resourcepacks_dir: {:?}\n",
            dir.join("state"),
            dir.join("resourcepacks"),
        );
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[tokio::test]
    async fn test_clear_uses_configured_server_cache() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        let server = dir.path().join("resourcepacks").join("server");
        std::fs::create_dir_all(&server).unwrap();
        std::fs::write(server.join("a1b2"), b"a").unwrap();
        std::fs::write(server.join("c3d4"), b"b").unwrap();
        std::fs::write(dir.path().join("resourcepacks").join("mine.zip"), b"keep").unwrap();

        handle_command(CacheCommand::Clear { dir: None }, Some(config)).await.unwrap();

        assert_eq!(std::fs::read_dir(&server).unwrap().count(), 0);
        assert!(dir.path().join("resourcepacks").join("mine.zip").exists());
    }

    #[tokio::test]
    async fn test_clear_prefers_explicit_dir() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        let other = dir.path().join("elsewhere");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("pack"), b"x").unwrap();

        handle_command(CacheCommand::Clear { dir: Some(other.clone()) }, Some(config))
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(&other).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_sandbox_listing_tolerates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        handle_command(CacheCommand::Sandbox, Some(config)).await.unwrap();
    }
}
