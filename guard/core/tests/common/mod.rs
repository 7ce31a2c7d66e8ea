// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hand-written port doubles shared by the integration tests.

#![allow(dead_code)]

use packguard_core::domain::config::GuardConfig;
use packguard_core::domain::decision::PackStatus;
use packguard_core::domain::notification::Toast;
use packguard_core::domain::ports::{
    ChatSink, HostResolver, PackPeer, PeerError, RenderError, SessionProvider, ToastRenderer,
};
use packguard_core::PackPolicyService;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves from a fixed table; unknown names fail like a DNS miss.
#[derive(Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn with(mut self, host: &str, ip: &str) -> Self {
        self.entries.insert(host.to_string(), ip.parse().unwrap());
        self
    }
}

impl HostResolver for StaticResolver {
    fn resolve(&self, host: &str, _port: u16) -> Option<IpAddr> {
        self.entries.get(host).copied()
    }
}

/// Simulates a resolver bug.
pub struct PanickingResolver;

impl HostResolver for PanickingResolver {
    fn resolve(&self, host: &str, _port: u16) -> Option<IpAddr> {
        panic!("resolver exploded on {}", host)
    }
}

#[derive(Default)]
pub struct RecordingPeer {
    pub statuses: Mutex<Vec<(Option<Uuid>, PackStatus)>>,
    pub cleared_prompts: Mutex<Vec<Option<Uuid>>>,
    pub fail_sends: bool,
}

impl RecordingPeer {
    pub fn statuses(&self) -> Vec<PackStatus> {
        self.statuses.lock().iter().map(|(_, status)| *status).collect()
    }
}

impl PackPeer for RecordingPeer {
    fn send_status(&self, pack_id: Option<Uuid>, status: PackStatus) -> Result<(), PeerError> {
        self.statuses.lock().push((pack_id, status));
        if self.fail_sends {
            return Err(PeerError::Closed);
        }
        Ok(())
    }

    fn clear_pending_prompt(&self, pack_id: Option<Uuid>) {
        self.cleared_prompts.lock().push(pack_id);
    }
}

pub struct FixedSession(pub &'static str);

impl SessionProvider for FixedSession {
    fn account_id(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

#[derive(Default)]
pub struct RecordingChat {
    pub messages: Mutex<Vec<String>>,
}

impl ChatSink for RecordingChat {
    fn send_chat(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Renders everything except toasts whose title matches `fail_title`.
#[derive(Default)]
pub struct RecordingRenderer {
    pub rendered: Mutex<Vec<Toast>>,
    pub fail_title: Option<&'static str>,
}

impl ToastRenderer for RecordingRenderer {
    fn render(&self, toast: &Toast) -> Result<(), RenderError> {
        if self.fail_title == Some(toast.title.as_str()) {
            return Err(RenderError("screen unavailable".to_string()));
        }
        self.rendered.lock().push(toast.clone());
        Ok(())
    }
}

/// Config rooted in `dir` with short download timeouts.
pub fn config_in(dir: &Path) -> GuardConfig {
    let mut config = GuardConfig {
        root_dir: dir.to_path_buf(),
        ..GuardConfig::default()
    };
    config.download.connect_timeout_ms = 2_000;
    config.download.request_timeout_ms = 5_000;
    config.download.poll_interval_ms = 20;
    config.download.poll_deadline_ms = 2_000;
    config
}

pub fn public_resolver() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::default()
            .with("example.com", "93.184.215.14")
            .with("packs.example.net", "203.0.113.7")
            .with("lan-server.home", "192.168.1.20"),
    )
}

pub fn service(config: GuardConfig) -> PackPolicyService {
    PackPolicyService::builder(config)
        .resolver(public_resolver())
        .build()
        .unwrap()
}

pub fn audit_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("packguard-audit.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
