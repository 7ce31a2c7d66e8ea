// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use packguard_core::PackPolicyService;

use super::load_config;
use crate::console::StaticSession;

#[derive(Args, Debug)]
pub struct RemapArgs {
    /// Directory the engine downloads server packs into
    #[arg(long, value_name = "DIR")]
    pub base: PathBuf,

    /// Path the engine intended to write
    #[arg(long, value_name = "FILE")]
    pub original: PathBuf,

    /// Pack identifier
    #[arg(long)]
    pub pack_id: Option<Uuid>,

    /// Account id to namespace the path with
    #[arg(long, env = "PACKGUARD_ACCOUNT")]
    pub account: Option<String>,
}

/// Print the path the engine would be told to use. The salt is per process,
/// so two invocations print different paths.
pub async fn handle_command(args: RemapArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_override)?;
    let service = PackPolicyService::builder(config)
        .session(Arc::new(StaticSession(args.account)))
        .build()
        .context("Failed to start pack policy service")?;

    let path = service.remap_download_path(&args.base, &args.original, args.pack_id);
    println!("{}", path.display());
    Ok(())
}
