// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::context::PackContext;

pub const REASON_WHITELISTED: &str = "Whitelisted host";
pub const REASON_EVALUATION_ERROR: &str = "Evaluation error";
pub const REASON_CACHED: &str = "Cached decision";
pub const REASON_BLOCK_ALL: &str = "Policy blocks all packs";
pub const REASON_SANDBOX_ALL: &str = "Policy sandboxes all packs";
pub const REASON_LOCAL_ORIGIN: &str = "Local origin blocked";
pub const REASON_PASSIVE: &str = "Policy passive";
pub const REASON_OBSERVE: &str = "Observe mode";

#[derive(Debug, Error)]
#[error("Unknown policy mode: '{0}'. Expected block_all, sandbox_all, block_local or observe")]
pub struct UnknownPolicyMode(pub String);

/// Outcome of evaluating one pack-delivery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Block,
    Sandbox,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::Block => "BLOCK",
            Decision::Sandbox => "SANDBOX",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured handling of pack-delivery requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    BlockAll,
    SandboxAll,
    BlockLocal,
    #[default]
    Observe,
}

impl FromStr for PolicyMode {
    type Err = UnknownPolicyMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "block_all" => Ok(PolicyMode::BlockAll),
            "sandbox_all" => Ok(PolicyMode::SandboxAll),
            "block_local" => Ok(PolicyMode::BlockLocal),
            "observe" => Ok(PolicyMode::Observe),
            _ => Err(UnknownPolicyMode(s.to_string())),
        }
    }
}

/// Protocol status replied to the peer. `Allow` sends nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackStatus {
    Declined,
    FailedDownload,
}

/// Decision plus the reason and the context it was made for.
#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub decision: Decision,
    pub reason: String,
    pub context: Arc<PackContext>,
}

impl PolicyResult {
    pub fn new(decision: Decision, reason: impl Into<String>, context: Arc<PackContext>) -> Self {
        Self {
            decision,
            reason: reason.into(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_mode_parsing() {
        assert_eq!("block_all".parse::<PolicyMode>().unwrap(), PolicyMode::BlockAll);
        assert_eq!("SANDBOX-ALL".parse::<PolicyMode>().unwrap(), PolicyMode::SandboxAll);
        assert_eq!(" observe ".parse::<PolicyMode>().unwrap(), PolicyMode::Observe);
        assert!("allow_everything".parse::<PolicyMode>().is_err());
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::Sandbox.to_string(), "SANDBOX");
    }
}
