// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Evaluate command
//!
//! Runs one pack request through the full pipeline and prints what a client
//! would do: the decision, the reply to the server, toasts, and the outcome
//! of any sandbox download.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use packguard_core::domain::context::PackRequest;
use packguard_core::domain::decision::{Decision, PolicyMode};
use packguard_core::{PackPolicyService, SandboxOutcome};

use super::load_config;
use crate::console::{ConsoleChat, ConsolePeer, ConsoleRenderer};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Pack URL as sent by the server
    #[arg(long, default_value = "")]
    pub url: String,

    /// Content hash as sent by the server
    #[arg(long, default_value = "")]
    pub hash: String,

    /// Server marked the pack as required
    #[arg(long)]
    pub required: bool,

    /// Prompt text shown with the request
    #[arg(long)]
    pub prompt: Option<String>,

    /// Pack identifier
    #[arg(long)]
    pub pack_id: Option<Uuid>,

    /// Transport address of the server (ip:port)
    #[arg(long)]
    pub remote: Option<String>,

    /// Override the configured policy (block_all, sandbox_all, block_local, observe)
    #[arg(long)]
    pub policy: Option<PolicyMode>,

    /// Print the decision as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl EvaluateArgs {
    fn request(&self) -> PackRequest {
        PackRequest {
            url: self.url.clone(),
            hash: self.hash.clone(),
            required: self.required,
            prompt: self.prompt.clone(),
            pack_id: self.pack_id,
        }
    }
}

pub async fn handle_command(args: EvaluateArgs, config_override: Option<PathBuf>) -> Result<()> {
    let mut config = load_config(config_override)?;
    if let Some(policy) = args.policy {
        config.policy = policy;
    }

    let service = PackPolicyService::builder(config)
        .chat(Arc::new(ConsoleChat))
        .build()
        .context("Failed to start pack policy service")?;
    service.startup();

    let request = args.request();
    let (result, task) = service.handle_request(&request, args.remote.as_deref(), &ConsolePeer);

    if args.json {
        let summary = serde_json::json!({
            "decision": result.decision,
            "reason": result.reason,
            "context": result.context.as_ref(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let decision = match result.decision {
            Decision::Allow => result.decision.as_str().green(),
            Decision::Sandbox => result.decision.as_str().yellow(),
            Decision::Block => result.decision.as_str().red(),
        };
        println!("{} {} ({})", "Decision:".bold(), decision, result.reason);
        println!("  Host: {}", result.context.host.display_name());
        println!(
            "  Local: {}",
            if result.context.host.local { "yes" } else { "no" }
        );
        if let Some(key) = &result.context.cache_key {
            println!("  Cache key: {}", key);
        }
    }

    if let Some(task) = task {
        match task.await.context("Sandbox task panicked")? {
            SandboxOutcome::Completed { path, extracted } => {
                println!("{}", format!("✓ Sandboxed to {}", path.display()).green());
                if let Some(dir) = extracted {
                    println!("  Extracted into {}", dir.display());
                }
            }
            SandboxOutcome::Failed { error } => {
                println!("{}", format!("✗ Sandbox download failed: {}", error).red());
            }
        }
    }

    service.flush_toasts(&ConsoleRenderer);
    Ok(())
}
