// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for PackGuard CLI

pub mod cache;
pub mod config;
pub mod evaluate;
pub mod remap;

pub use self::cache::CacheCommand;
pub use self::config::ConfigCommand;
pub use self::evaluate::EvaluateArgs;
pub use self::remap::RemapArgs;

use anyhow::{Context, Result};
use packguard_core::domain::config::{GuardConfig, GuardConfigManifest};
use std::path::PathBuf;
use tracing::debug;

/// Load, override and validate the configuration every command runs with.
pub fn load_config(config_override: Option<PathBuf>) -> Result<GuardConfig> {
    let manifest =
        GuardConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;
    debug!(name = %manifest.metadata.name, policy = ?manifest.spec.policy, "Configuration loaded");
    Ok(manifest.spec)
}
