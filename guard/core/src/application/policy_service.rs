// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pack Policy Application Service
//!
//! The long-lived object a host embeds. It owns every piece of session state
//! (decision cache, fingerprint histories, registries, toast queue) and
//! exposes the operations the host calls:
//!
//! - [`PackPolicyService::evaluate`] for each inbound pack request
//! - [`PackPolicyService::apply_decision`] to reply to the peer and start sandboxing
//! - [`PackPolicyService::remap_download_path`] from the engine's own downloader
//! - [`PackPolicyService::flush_toasts`] from the UI tick
//!
//! `evaluate` never fails: any error or panic while deciding falls back to
//! ALLOW so a broken policy cannot break normal pack delivery.

use chrono::Utc;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::cache_isolation::CacheIsolator;
use crate::application::sandbox::{SandboxDownloader, SandboxOutcome, SandboxShared};
use crate::domain::config::GuardConfig;
use crate::domain::context::{ContextError, PackContext, PackRequest};
use crate::domain::decision::{
    Decision, PackStatus, PolicyMode, PolicyResult, REASON_BLOCK_ALL, REASON_CACHED,
    REASON_EVALUATION_ERROR, REASON_LOCAL_ORIGIN, REASON_OBSERVE, REASON_PASSIVE,
    REASON_SANDBOX_ALL, REASON_WHITELISTED,
};
use crate::domain::decision_cache::DecisionCache;
use crate::domain::events::{PackEvent, SandboxFlavor};
use crate::domain::fingerprint::{FingerprintAlert, FingerprintDetector};
use crate::domain::host::HostClassifier;
use crate::domain::notification::{NotificationQueue, ToastLevel};
use crate::domain::ports::{ChatSink, HostResolver, NoSession, PackPeer, SessionProvider, ToastRenderer};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::host_resolver::SystemResolver;
use crate::infrastructure::http_fetcher::FetchError;
use crate::infrastructure::pack_cache::clear_server_pack_cache;
use crate::infrastructure::registry::{ContextRegistry, DownloadTargetRegistry, SnapshotDedupe};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to prepare sandbox downloader: {0}")]
    Http(#[from] FetchError),

    #[error("no tokio runtime available; pass a runtime handle to the builder")]
    NoRuntime,
}

pub struct PackPolicyServiceBuilder {
    config: GuardConfig,
    resolver: Option<Arc<dyn HostResolver>>,
    session: Option<Arc<dyn SessionProvider>>,
    chat: Option<Arc<dyn ChatSink>>,
    runtime: Option<Handle>,
    events: Option<EventBus>,
}

impl PackPolicyServiceBuilder {
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn chat(mut self, chat: Arc<dyn ChatSink>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<PackPolicyService, ServiceError> {
        self.config
            .validate()
            .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ServiceError::NoRuntime)?,
        };
        let config = self.config;
        let resolver = self.resolver.unwrap_or_else(|| Arc::new(SystemResolver));
        let session = self.session.unwrap_or_else(|| Arc::new(NoSession));
        let events = self.events.unwrap_or_default();

        let notifications = Arc::new(NotificationQueue::new(config.toast_level));
        let audit = Arc::new(AuditLog::new(config.audit_log_path(), config.audit_log));
        let contexts = ContextRegistry::new();
        let targets = Arc::new(DownloadTargetRegistry::new());
        let dedupe = Arc::new(SnapshotDedupe::new());

        let shared = SandboxShared {
            notifications: notifications.clone(),
            audit: audit.clone(),
            contexts: contexts.clone(),
            targets: targets.clone(),
            dedupe: dedupe.clone(),
            events: events.clone(),
        };
        let sandbox = Arc::new(SandboxDownloader::new(&config, shared.clone())?);

        let isolator = CacheIsolator::new(
            config.cache_isolation,
            session,
            contexts.clone(),
            targets.clone(),
            audit.clone(),
            events.clone(),
        );

        Ok(PackPolicyService {
            classifier: HostClassifier::new(resolver),
            cache: DecisionCache::new(),
            detector: FingerprintDetector::new(
                config.fingerprint_threshold,
                config.fingerprint_window_ms,
            ),
            notifications,
            audit,
            contexts,
            targets,
            dedupe,
            isolator,
            sandbox: RwLock::new(sandbox),
            shared,
            chat: self.chat,
            events,
            runtime,
            config: RwLock::new(config),
        })
    }
}

pub struct PackPolicyService {
    config: RwLock<GuardConfig>,
    classifier: HostClassifier,
    cache: DecisionCache,
    detector: FingerprintDetector,
    notifications: Arc<NotificationQueue>,
    audit: Arc<AuditLog>,
    contexts: ContextRegistry,
    targets: Arc<DownloadTargetRegistry>,
    dedupe: Arc<SnapshotDedupe>,
    isolator: CacheIsolator,
    sandbox: RwLock<Arc<SandboxDownloader>>,
    shared: SandboxShared,
    chat: Option<Arc<dyn ChatSink>>,
    events: EventBus,
    runtime: Handle,
}

impl PackPolicyService {
    pub fn builder(config: GuardConfig) -> PackPolicyServiceBuilder {
        PackPolicyServiceBuilder {
            config,
            resolver: None,
            session: None,
            chat: None,
            runtime: None,
            events: None,
        }
    }

    // ========================================================================
    // Decision path
    // ========================================================================

    /// Decide what to do with one inbound pack request.
    pub fn evaluate(&self, request: &PackRequest, remote: Option<&str>) -> PolicyResult {
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_evaluate(request, remote))) {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => self.fail_open(request, remote, &error.to_string()),
            Err(payload) => self.fail_open(request, remote, &panic_message(payload.as_ref())),
        }
    }

    /// `evaluate` followed by `apply_decision`.
    pub fn handle_request(
        &self,
        request: &PackRequest,
        remote: Option<&str>,
        peer: &dyn PackPeer,
    ) -> (PolicyResult, Option<JoinHandle<SandboxOutcome>>) {
        let result = self.evaluate(request, remote);
        let task = self.apply_decision(&result, peer);
        (result, task)
    }

    fn try_evaluate(&self, request: &PackRequest, remote: Option<&str>) -> Result<PolicyResult, ContextError> {
        let context = Arc::new(PackContext::build(request, &self.classifier, remote)?);

        if let Some(key) = &context.cache_key {
            if let Some(decision) = self.cache.get(key) {
                debug!(cache_key = %key, %decision, "Using cached pack decision");
                return Ok(PolicyResult::new(decision, REASON_CACHED, context));
            }
        }

        self.contexts.register(&context);
        self.record_fingerprint(&context);

        let (policy, whitelisted) = {
            let config = self.config.read();
            (config.policy, config.is_whitelisted(&context.host))
        };

        let (decision, reason) = if whitelisted {
            (Decision::Allow, REASON_WHITELISTED)
        } else {
            match policy {
                PolicyMode::BlockAll => (Decision::Block, REASON_BLOCK_ALL),
                PolicyMode::SandboxAll => (Decision::Sandbox, REASON_SANDBOX_ALL),
                PolicyMode::BlockLocal if context.host.local => (Decision::Block, REASON_LOCAL_ORIGIN),
                PolicyMode::BlockLocal => (Decision::Allow, REASON_PASSIVE),
                PolicyMode::Observe => {
                    if !context.required || context.has_prompt() {
                        self.schedule_prompt_snapshot(&context);
                    }
                    (Decision::Allow, REASON_OBSERVE)
                }
            }
        };

        if let Some(key) = &context.cache_key {
            self.cache.put(key.clone(), decision);
        }

        let result = PolicyResult::new(decision, reason, context);
        self.announce(&result);
        Ok(result)
    }

    fn fail_open(&self, request: &PackRequest, remote: Option<&str>, error: &str) -> PolicyResult {
        warn!(url = %request.url.trim(), %error, "Pack evaluation failed, falling back to vanilla handling");
        self.notifications.push(
            ToastLevel::Warn,
            "Pack check failed",
            "Using vanilla pack handling",
        );
        let context = Arc::new(PackContext::degraded(request, remote));
        PolicyResult::new(Decision::Allow, REASON_EVALUATION_ERROR, context)
    }

    fn record_fingerprint(&self, context: &PackContext) {
        let origin = context.host.canonical_or_fallback();
        let Some(alert) = self.detector.record(origin, Utc::now().timestamp_millis()) else {
            return;
        };
        self.raise_fingerprint_alert(context, &alert);
    }

    fn raise_fingerprint_alert(&self, context: &PackContext, alert: &FingerprintAlert) {
        let message = format!(
            "{} sent {} pack requests within {}s",
            alert.origin,
            alert.count,
            alert.window_ms / 1000
        );
        warn!(origin = %alert.origin, count = alert.count, window_ms = alert.window_ms, "Possible pack fingerprinting");

        self.notifications
            .push(ToastLevel::Warn, "Possible pack fingerprinting", message.clone());
        self.audit.record(
            "FINGERPRINT",
            Some(context),
            Some(&format!("count={} windowMs={}", alert.count, alert.window_ms)),
        );
        if self.config.read().fingerprint_chat_alert {
            if let Some(chat) = &self.chat {
                chat.send_chat(&format!("[PackGuard] Possible fingerprinting: {}", message));
            }
        }
        metrics::counter!("packguard_fingerprint_alerts_total").increment(1);
        self.events.publish(PackEvent::FingerprintSuspected {
            origin: alert.origin.clone(),
            request_count: alert.count,
            window_ms: alert.window_ms,
            detected_at: Utc::now(),
        });
    }

    fn announce(&self, result: &PolicyResult) {
        let context = &result.context;
        let (level, title) = match result.decision {
            Decision::Allow => (ToastLevel::Info, "Pack allowed"),
            Decision::Sandbox => (ToastLevel::Info, "Pack sandboxed"),
            Decision::Block => (ToastLevel::Warn, "Pack blocked"),
        };

        info!(
            host = %context.host.display_name(),
            decision = %result.decision,
            reason = %result.reason,
            "Pack decision"
        );
        self.notifications.push(
            level,
            title,
            format!("{}: {}", context.host.display_name(), result.reason),
        );
        self.audit.record(
            result.decision.as_str(),
            Some(context),
            Some(&format!("reason={}", result.reason)),
        );
        metrics::counter!("packguard_decisions_total", "decision" => result.decision.as_str()).increment(1);
        self.events.publish(PackEvent::DecisionMade {
            host: context.host.display_name().to_string(),
            cache_key: context.cache_key.clone(),
            pack_id: context.pack_id,
            decision: result.decision,
            reason: result.reason.clone(),
            decided_at: Utc::now(),
        });
    }

    /// Reply to the peer and start whatever work the decision implies.
    ///
    /// Returns the sandbox task for SANDBOX decisions.
    pub fn apply_decision(
        &self,
        result: &PolicyResult,
        peer: &dyn PackPeer,
    ) -> Option<JoinHandle<SandboxOutcome>> {
        let context = &result.context;
        match result.decision {
            Decision::Allow => None,
            Decision::Block => {
                peer.clear_pending_prompt(context.pack_id);
                send_status(peer, context.pack_id, PackStatus::Declined);
                self.contexts.mark_handled(context);
                None
            }
            Decision::Sandbox => {
                send_status(peer, context.pack_id, PackStatus::FailedDownload);
                Some(self.spawn_sandbox(context.clone(), SandboxFlavor::PolicySandbox, None))
            }
        }
    }

    /// Start a prompt-inspection copy unless one is already running for this pack.
    ///
    /// Returns `true` when a snapshot task was started.
    pub fn schedule_prompt_snapshot(&self, context: &Arc<PackContext>) -> bool {
        let Some(key) = snapshot_key(context) else {
            return false;
        };
        if !self.dedupe.try_acquire(&key) {
            debug!(key = %key, "Prompt snapshot already in flight");
            return false;
        }
        self.spawn_sandbox(context.clone(), SandboxFlavor::PromptInspection, Some(key));
        true
    }

    fn spawn_sandbox(
        &self,
        context: Arc<PackContext>,
        flavor: SandboxFlavor,
        dedupe_key: Option<String>,
    ) -> JoinHandle<SandboxOutcome> {
        let sandbox = self.sandbox.read().clone();
        self.runtime
            .spawn(async move { sandbox.run(context, flavor, dedupe_key).await })
    }

    // ========================================================================
    // Host hooks
    // ========================================================================

    /// Where the engine should store a server pack it is about to download.
    pub fn remap_download_path(&self, base: &Path, original: &Path, pack_id: Option<Uuid>) -> PathBuf {
        self.isolator.remap_download_path(base, original, pack_id)
    }

    /// One-time startup work. Returns the number of cached server packs removed.
    pub fn startup(&self) -> usize {
        let cache_dir = {
            let config = self.config.read();
            if !config.clear_cache_on_start {
                return 0;
            }
            config.server_cache_dir()
        };
        let Some(cache_dir) = cache_dir else {
            debug!("No resource-packs directory configured; nothing to clear");
            return 0;
        };

        match clear_server_pack_cache(&cache_dir) {
            Ok(removed) => {
                self.audit.record(
                    "CLEAR_CACHE",
                    None,
                    Some(&format!("dir={} removed={}", cache_dir.display(), removed)),
                );
                removed
            }
            Err(error) => {
                warn!(dir = %cache_dir.display(), %error, "Could not clear server pack cache");
                0
            }
        }
    }

    /// Render pending toasts. Returns how many rendered successfully.
    pub fn flush_toasts(&self, renderer: &dyn ToastRenderer) -> usize {
        self.notifications.flush(renderer)
    }

    /// Forget everything learned during the current server session.
    pub fn reset_session(&self) {
        self.cache.clear();
        self.detector.clear();
        self.contexts.clear();
        self.targets.clear();
        info!("Pack session state reset");
    }

    /// Swap in a new configuration. Cached decisions are dropped since they
    /// were made under the old policy.
    pub fn update_config(&self, config: GuardConfig) -> Result<(), ServiceError> {
        config
            .validate()
            .map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;

        let sandbox = SandboxDownloader::new(&config, self.shared.clone())?;
        *self.sandbox.write() = Arc::new(sandbox);

        self.notifications.set_threshold(config.toast_level);
        self.audit.set_enabled(config.audit_log);
        self.isolator.set_enabled(config.cache_isolation);
        self.detector
            .reconfigure(config.fingerprint_threshold, config.fingerprint_window_ms);
        self.cache.clear();

        if self.audit.path() != config.audit_log_path() {
            warn!(
                current = %self.audit.path().display(),
                requested = %config.audit_log_path().display(),
                "Audit log path changes take effect on restart"
            );
        }

        *self.config.write() = config;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> GuardConfig {
        self.config.read().clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn decision_cache(&self) -> &DecisionCache {
        &self.cache
    }

    pub fn fingerprint_detector(&self) -> &FingerprintDetector {
        &self.detector
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn download_targets(&self) -> &DownloadTargetRegistry {
        &self.targets
    }

    pub fn snapshots_in_flight(&self) -> usize {
        self.dedupe.count()
    }

    pub fn cache_salt(&self) -> &str {
        self.isolator.salt()
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.sandbox.read().sandbox_dir().to_path_buf()
    }
}

/// Snapshot dedupe key: cache key, else pack id, else URL.
fn snapshot_key(context: &PackContext) -> Option<String> {
    context
        .cache_key
        .clone()
        .or_else(|| context.pack_id.map(|id| id.to_string()))
        .or_else(|| (!context.url.is_empty()).then(|| context.url.clone()))
}

fn send_status(peer: &dyn PackPeer, pack_id: Option<Uuid>, status: PackStatus) {
    if let Err(error) = peer.send_status(pack_id, status) {
        debug!(?status, %error, "Pack status reply not delivered");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic during evaluation".to_string()
    }
}
