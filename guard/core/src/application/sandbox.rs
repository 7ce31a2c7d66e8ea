// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sandbox Downloader Application Service
//!
//! Fetches a pack into the sandbox directory instead of letting the engine
//! apply it. Coordinates:
//! - Domain layer: file naming, notifications, pack contexts
//! - Infrastructure layer: HTTP fetcher, cached-pack copier, archive extraction,
//!   audit log, session registries
//! - Event bus: `SandboxStarted` / `SandboxCompleted` / `SandboxFailed`
//!
//! Both sandbox flavors share this routine; they only differ in the labels
//! looked up from [`FlavorLabels::for_flavor`].

use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::config::GuardConfig;
use crate::domain::context::PackContext;
use crate::domain::events::{PackEvent, SandboxFlavor};
use crate::domain::file_naming::{pick_extension, reserve_unique_file, sandbox_base_name};
use crate::domain::notification::{NotificationQueue, ToastLevel};
use crate::infrastructure::archive::{extract_zip, is_zip_archive};
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::cached_pack_copier::CachedPackCopier;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::http_fetcher::{parse_pack_url, FetchError, HttpFetcher};
use crate::infrastructure::registry::{ContextRegistry, DownloadTargetRegistry, SnapshotDedupe};

const MAX_TOAST_ERROR_CHARS: usize = 96;

/// Notification copy and audit tags of one sandbox flavor.
#[derive(Debug)]
pub struct FlavorLabels {
    pub start_title: &'static str,
    pub ok_title: &'static str,
    pub fail_title: &'static str,
    pub audit_start: &'static str,
    pub audit_ok: &'static str,
    pub audit_fail: &'static str,
    pub start_level: ToastLevel,
    pub ok_level: ToastLevel,
    pub fail_level: ToastLevel,
}

static POLICY_SANDBOX: FlavorLabels = FlavorLabels {
    start_title: "Sandboxing pack",
    ok_title: "Pack sandboxed",
    fail_title: "Sandbox download failed",
    audit_start: "SANDBOX_START",
    audit_ok: "SANDBOX_OK",
    audit_fail: "SANDBOX_FAIL",
    start_level: ToastLevel::Info,
    ok_level: ToastLevel::Info,
    fail_level: ToastLevel::Warn,
};

static PROMPT_INSPECTION: FlavorLabels = FlavorLabels {
    start_title: "Saving pack snapshot",
    ok_title: "Pack snapshot saved",
    fail_title: "Pack snapshot failed",
    audit_start: "SNAPSHOT_START",
    audit_ok: "SNAPSHOT_OK",
    audit_fail: "SNAPSHOT_FAIL",
    start_level: ToastLevel::Info,
    ok_level: ToastLevel::Info,
    fail_level: ToastLevel::Info,
};

impl FlavorLabels {
    pub fn for_flavor(flavor: SandboxFlavor) -> &'static FlavorLabels {
        match flavor {
            SandboxFlavor::PolicySandbox => &POLICY_SANDBOX,
            SandboxFlavor::PromptInspection => &PROMPT_INSPECTION,
        }
    }
}

/// Final result of one sandbox task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    Completed {
        path: PathBuf,
        extracted: Option<PathBuf>,
    },
    Failed {
        error: String,
    },
}

impl SandboxOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SandboxOutcome::Completed { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SandboxOutcome::Completed { path, .. } => Some(path),
            SandboxOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
enum SandboxError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("cached pack not found")]
    CachedPackNotFound,

    #[error("no download source")]
    NoSource,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("copy task failed: {0}")]
    Task(String),
}

/// Collaborators shared with the policy service.
#[derive(Clone)]
pub struct SandboxShared {
    pub notifications: Arc<NotificationQueue>,
    pub audit: Arc<AuditLog>,
    pub contexts: ContextRegistry,
    pub targets: Arc<DownloadTargetRegistry>,
    pub dedupe: Arc<SnapshotDedupe>,
    pub events: EventBus,
}

pub struct SandboxDownloader {
    sandbox_dir: PathBuf,
    extract: bool,
    fetcher: HttpFetcher,
    copier: CachedPackCopier,
    shared: SandboxShared,
}

impl SandboxDownloader {
    pub fn new(config: &GuardConfig, shared: SandboxShared) -> Result<Self, FetchError> {
        Ok(Self {
            sandbox_dir: config.sandbox_dir(),
            extract: config.extract_after_sandbox,
            fetcher: HttpFetcher::new(&config.download)?,
            copier: CachedPackCopier::from_config(shared.targets.clone(), &config.download),
            shared,
        })
    }

    pub fn sandbox_dir(&self) -> &Path {
        &self.sandbox_dir
    }

    /// Download `context` into the sandbox.
    ///
    /// `dedupe_key` is released whatever the outcome. The context is marked
    /// handled once the task ends.
    pub async fn run(
        &self,
        context: Arc<PackContext>,
        flavor: SandboxFlavor,
        dedupe_key: Option<String>,
    ) -> SandboxOutcome {
        let labels = FlavorLabels::for_flavor(flavor);

        let url = if context.url.is_empty() {
            None
        } else {
            match parse_pack_url(&context.url) {
                Ok(url) => Some(url),
                Err(error) => {
                    return self.fail(&context, flavor, dedupe_key.as_deref(), None, error.into());
                }
            }
        };

        if let Err(error) = tokio::fs::create_dir_all(&self.sandbox_dir).await {
            return self.fail(&context, flavor, dedupe_key.as_deref(), None, error.into());
        }

        let target = match self.reserve_target(&context, url.as_ref()) {
            Ok(target) => target,
            Err(error) => {
                return self.fail(&context, flavor, dedupe_key.as_deref(), None, error.into());
            }
        };

        self.shared.notifications.push(
            labels.start_level,
            labels.start_title,
            context.host.display_name().to_string(),
        );
        self.shared.audit.record(
            labels.audit_start,
            Some(&context),
            Some(&format!("target={}", target.display())),
        );
        self.shared.events.publish(PackEvent::SandboxStarted {
            flavor,
            pack_id: context.pack_id,
            target: target.clone(),
            started_at: Utc::now(),
        });

        let result = match &url {
            Some(url) => self
                .fetcher
                .fetch_to_file(url, &target)
                .await
                .map_err(SandboxError::from)
                .and_then(|_| std::path::absolute(&target).map_err(SandboxError::from)),
            None => self.copy_cached(&context, &target).await,
        };

        match result {
            Ok(path) => self.complete(&context, flavor, dedupe_key.as_deref(), path).await,
            Err(error) => self.fail(&context, flavor, dedupe_key.as_deref(), Some(&target), error),
        }
    }

    fn reserve_target(&self, context: &PackContext, url: Option<&Url>) -> io::Result<PathBuf> {
        let known_cache_file = context
            .registry_key()
            .and_then(|key| self.shared.targets.lookup(&key));
        let extension = pick_extension(url, known_cache_file.as_deref());
        reserve_unique_file(&self.sandbox_dir, &sandbox_base_name(context), &extension)
    }

    async fn copy_cached(&self, context: &PackContext, target: &Path) -> Result<PathBuf, SandboxError> {
        let key = context.registry_key().ok_or(SandboxError::NoSource)?;
        let copier = self.copier.clone();
        let dest = target.to_path_buf();

        let copied = tokio::task::spawn_blocking(move || copier.copy_when_stable(&key, &dest))
            .await
            .map_err(|e| SandboxError::Task(e.to_string()))??;
        copied.ok_or(SandboxError::CachedPackNotFound)
    }

    async fn complete(
        &self,
        context: &PackContext,
        flavor: SandboxFlavor,
        dedupe_key: Option<&str>,
        path: PathBuf,
    ) -> SandboxOutcome {
        let labels = FlavorLabels::for_flavor(flavor);
        info!(path = %path.display(), ?flavor, "Pack sandboxed");

        self.shared
            .notifications
            .push(labels.ok_level, labels.ok_title, path.display().to_string());
        self.shared
            .audit
            .record(labels.audit_ok, Some(context), Some(&format!("path={}", path.display())));
        if let Some(key) = dedupe_key {
            self.shared.dedupe.release(key);
        }
        if let Some(key) = context.registry_key() {
            self.shared.targets.remove(&key);
        }

        let extracted = if self.extract && is_zip_archive(&path) {
            self.extract_archive(context, &path).await
        } else {
            None
        };

        self.shared.contexts.mark_handled(context);
        self.shared.events.publish(PackEvent::SandboxCompleted {
            flavor,
            pack_id: context.pack_id,
            path: path.clone(),
            extracted: extracted.clone(),
            completed_at: Utc::now(),
        });
        SandboxOutcome::Completed { path, extracted }
    }

    async fn extract_archive(&self, context: &PackContext, archive: &Path) -> Option<PathBuf> {
        let archive_path = archive.to_path_buf();
        let result = tokio::task::spawn_blocking(move || extract_zip(&archive_path)).await;

        match result {
            Ok(Ok(extraction)) => {
                self.shared.audit.record(
                    "EXTRACT",
                    Some(context),
                    Some(&format!(
                        "dir={} files={}",
                        extraction.directory.display(),
                        extraction.files
                    )),
                );
                Some(extraction.directory)
            }
            Ok(Err(error)) => {
                warn!(archive = %archive.display(), %error, "Sandbox extraction failed");
                None
            }
            Err(error) => {
                warn!(archive = %archive.display(), %error, "Sandbox extraction task failed");
                None
            }
        }
    }

    fn fail(
        &self,
        context: &PackContext,
        flavor: SandboxFlavor,
        dedupe_key: Option<&str>,
        partial: Option<&Path>,
        error: SandboxError,
    ) -> SandboxOutcome {
        let labels = FlavorLabels::for_flavor(flavor);
        let message = short_message(&error.to_string());
        warn!(url = %context.url, ?flavor, error = %message, "Sandbox download failed");

        if let Some(partial) = partial {
            if let Err(e) = std::fs::remove_file(partial) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = %partial.display(), error = %e, "Could not remove partial sandbox file");
                }
            }
        }

        self.shared
            .notifications
            .push(labels.fail_level, labels.fail_title, message.clone());
        self.shared
            .audit
            .record(labels.audit_fail, Some(context), Some(&format!("error={}", message)));
        if let Some(key) = dedupe_key {
            self.shared.dedupe.release(key);
        }
        self.shared.contexts.mark_handled(context);
        self.shared.events.publish(PackEvent::SandboxFailed {
            flavor,
            pack_id: context.pack_id,
            error: message.clone(),
            failed_at: Utc::now(),
        });
        SandboxOutcome::Failed { error: message }
    }
}

fn short_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() <= MAX_TOAST_ERROR_CHARS {
        first_line.to_string()
    } else {
        let mut short: String = first_line.chars().take(MAX_TOAST_ERROR_CHARS - 3).collect();
        short.push_str("...");
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::HostInfo;
    use tempfile::TempDir;

    fn shared(dir: &Path) -> SandboxShared {
        SandboxShared {
            notifications: Arc::new(NotificationQueue::default()),
            audit: Arc::new(AuditLog::new(dir.join("audit.log"), true)),
            contexts: ContextRegistry::new(),
            targets: Arc::new(DownloadTargetRegistry::new()),
            dedupe: Arc::new(SnapshotDedupe::new()),
            events: EventBus::default(),
        }
    }

    fn downloader(dir: &Path, shared: SandboxShared) -> SandboxDownloader {
        let mut config = GuardConfig {
            root_dir: dir.to_path_buf(),
            ..GuardConfig::default()
        };
        config.download.poll_interval_ms = 10;
        config.download.poll_deadline_ms = 100;
        SandboxDownloader::new(&config, shared).unwrap()
    }

    fn context(url: &str, hash: &str) -> Arc<PackContext> {
        Arc::new(PackContext {
            url: url.to_string(),
            hash: hash.to_string(),
            host: HostInfo {
                host: "127.0.0.1".to_string(),
                canonical: "127.0.0.1".to_string(),
                ..HostInfo::default()
            },
            required: false,
            cache_key: Some(format!("hash:127.0.0.1|{}", hash)),
            pack_id: None,
            prompt: String::new(),
        })
    }

    #[test]
    fn test_flavor_table() {
        let policy = FlavorLabels::for_flavor(SandboxFlavor::PolicySandbox);
        let prompt = FlavorLabels::for_flavor(SandboxFlavor::PromptInspection);
        assert_ne!(policy.audit_ok, prompt.audit_ok);
        assert_eq!(policy.fail_level, ToastLevel::Warn);
    }

    #[test]
    fn test_short_message() {
        assert_eq!(short_message("HTTP 404\ndetails"), "HTTP 404");
        assert_eq!(short_message(&"x".repeat(200)).chars().count(), MAX_TOAST_ERROR_CHARS);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_fails_and_releases_dedupe() {
        let dir = TempDir::new().unwrap();
        let shared = shared(dir.path());
        shared.dedupe.try_acquire("k");
        let downloader = downloader(dir.path(), shared.clone());

        let outcome = downloader
            .run(context("ftp://127.0.0.1/p.zip", "aa"), SandboxFlavor::PromptInspection, Some("k".into()))
            .await;

        assert!(!outcome.is_completed());
        assert!(!shared.dedupe.is_in_flight("k"));
        let audit = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(audit.contains("[SNAPSHOT_FAIL]"));
    }

    #[tokio::test]
    async fn test_http_failure_removes_partial_file() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone.zip")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let downloader = downloader(dir.path(), shared(dir.path()));
        let outcome = downloader
            .run(
                context(&format!("{}/gone.zip", server.url()), "deadbeef"),
                SandboxFlavor::PolicySandbox,
                None,
            )
            .await;

        assert_eq!(outcome, SandboxOutcome::Failed { error: "HTTP 404".to_string() });
        let leftovers = std::fs::read_dir(downloader.sandbox_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_no_url_and_no_cached_file_fails() {
        let dir = TempDir::new().unwrap();
        let downloader = downloader(dir.path(), shared(dir.path()));
        let outcome = downloader
            .run(context("", "cafe"), SandboxFlavor::PolicySandbox, None)
            .await;
        assert_eq!(
            outcome,
            SandboxOutcome::Failed { error: "cached pack not found".to_string() }
        );
    }
}
