// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::decision::Decision;

/// Which sandbox pipeline produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxFlavor {
    /// Copy made because the policy decided SANDBOX
    PolicySandbox,
    /// Side-channel copy of a prompted or optional pack for user inspection
    PromptInspection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PackEvent {
    DecisionMade {
        host: String,
        cache_key: Option<String>,
        pack_id: Option<Uuid>,
        decision: Decision,
        reason: String,
        decided_at: DateTime<Utc>,
    },
    FingerprintSuspected {
        origin: String,
        request_count: usize,
        window_ms: i64,
        detected_at: DateTime<Utc>,
    },
    SandboxStarted {
        flavor: SandboxFlavor,
        pack_id: Option<Uuid>,
        target: PathBuf,
        started_at: DateTime<Utc>,
    },
    SandboxCompleted {
        flavor: SandboxFlavor,
        pack_id: Option<Uuid>,
        path: PathBuf,
        extracted: Option<PathBuf>,
        completed_at: DateTime<Utc>,
    },
    SandboxFailed {
        flavor: SandboxFlavor,
        pack_id: Option<Uuid>,
        error: String,
        failed_at: DateTime<Utc>,
    },
    DownloadPathRemapped {
        pack_id: Option<Uuid>,
        original: PathBuf,
        remapped: PathBuf,
        remapped_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = PackEvent::DecisionMade {
            host: "example.com".to_string(),
            cache_key: Some("pack:1".to_string()),
            pack_id: None,
            decision: Decision::Sandbox,
            reason: "Policy sandboxes all packs".to_string(),
            decided_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "decision_made");
        assert_eq!(json["decision"], "SANDBOX");

        let failed = PackEvent::SandboxFailed {
            flavor: SandboxFlavor::PromptInspection,
            pack_id: None,
            error: "HTTP 404".to_string(),
            failed_at: Utc::now(),
        };
        assert_eq!(serde_json::to_value(&failed).unwrap()["flavor"], "prompt_inspection");
    }
}
