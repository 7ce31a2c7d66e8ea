// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cache-Path Isolator
//!
//! Rewrites where the engine's own downloader stores server packs so that two
//! accounts, or two launches of the same account, never share an on-disk path:
//!
//! ```text
//! <base>/isolated-cache/<account>/<process salt>/<file name>
//! ```
//!
//! The resolved path is always registered as the download target of the
//! request, which is how the cached-pack copier finds URL-less packs.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::events::PackEvent;
use crate::domain::file_naming::{safe_file_name, sanitize_component, MAX_BASE_NAME_LEN};
use crate::domain::ports::SessionProvider;
use crate::infrastructure::audit_log::AuditLog;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::registry::{ContextRegistry, DownloadTargetRegistry};

pub const ISOLATION_NAMESPACE: &str = "isolated-cache";
pub const ANONYMOUS_ACCOUNT: &str = "anonymous";

pub struct CacheIsolator {
    enabled: AtomicBool,
    salt: String,
    session: Arc<dyn SessionProvider>,
    contexts: ContextRegistry,
    targets: Arc<DownloadTargetRegistry>,
    audit: Arc<AuditLog>,
    events: EventBus,
}

impl CacheIsolator {
    pub fn new(
        enabled: bool,
        session: Arc<dyn SessionProvider>,
        contexts: ContextRegistry,
        targets: Arc<DownloadTargetRegistry>,
        audit: Arc<AuditLog>,
        events: EventBus,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            salt: hex::encode(rand::random::<[u8; 8]>()),
            session,
            contexts,
            targets,
            audit,
            events,
        }
    }

    /// 16 hex characters, fixed for the lifetime of this isolator.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn remap_download_path(&self, base: &Path, original: &Path, pack_id: Option<Uuid>) -> PathBuf {
        let context = pack_id.and_then(|id| self.contexts.lookup(id));

        let resolved = if self.is_enabled() {
            let file_name = safe_file_name(original)
                .or_else(|| pack_id.map(|id| id.to_string()))
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let isolated = base
                .join(ISOLATION_NAMESPACE)
                .join(self.account_segment())
                .join(&self.salt)
                .join(file_name);
            if let Some(parent) = isolated.parent() {
                if let Err(error) = std::fs::create_dir_all(parent) {
                    debug!(dir = %parent.display(), %error, "Could not prepare isolated cache directory");
                }
            }
            isolated
        } else {
            original.to_path_buf()
        };

        self.audit.record(
            "REMAP",
            context.as_deref(),
            Some(&format!("original={} path={}", original.display(), resolved.display())),
        );

        let key = pack_id
            .map(|id| id.to_string())
            .or_else(|| context.as_ref().and_then(|ctx| ctx.registry_key()));
        if let Some(key) = key {
            self.targets.register(key, &resolved);
        }

        self.events.publish(PackEvent::DownloadPathRemapped {
            pack_id,
            original: original.to_path_buf(),
            remapped: resolved.clone(),
            remapped_at: Utc::now(),
        });
        debug!(original = %original.display(), remapped = %resolved.display(), "Download path resolved");

        resolved
    }

    fn account_segment(&self) -> String {
        self.session
            .account_id()
            .map(|id| sanitize_component(id.trim(), MAX_BASE_NAME_LEN))
            .filter(|id| !id.trim_matches('_').is_empty())
            .unwrap_or_else(|| ANONYMOUS_ACCOUNT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NoSession;
    use tempfile::TempDir;

    struct FixedSession(&'static str);

    impl SessionProvider for FixedSession {
        fn account_id(&self) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    fn isolator(dir: &Path, enabled: bool, session: Arc<dyn SessionProvider>) -> (CacheIsolator, Arc<DownloadTargetRegistry>) {
        let targets = Arc::new(DownloadTargetRegistry::new());
        let isolator = CacheIsolator::new(
            enabled,
            session,
            ContextRegistry::new(),
            targets.clone(),
            Arc::new(AuditLog::new(dir.join("audit.log"), true)),
            EventBus::default(),
        );
        (isolator, targets)
    }

    #[test]
    fn test_isolated_layout() {
        let dir = TempDir::new().unwrap();
        let (isolator, targets) = isolator(dir.path(), true, Arc::new(FixedSession("acc-1")));
        let id = Uuid::new_v4();

        let path = isolator.remap_download_path(dir.path(), Path::new("/cache/server/abc.zip"), Some(id));

        assert_eq!(
            path,
            dir.path()
                .join(ISOLATION_NAMESPACE)
                .join("acc-1")
                .join(isolator.salt())
                .join("abc.zip")
        );
        assert_eq!(isolator.salt().len(), 16);
        assert_eq!(targets.lookup(&id.to_string()), Some(path));
    }

    #[test]
    fn test_anonymous_and_pack_id_fallbacks() {
        let dir = TempDir::new().unwrap();
        let (isolator, _) = isolator(dir.path(), true, Arc::new(NoSession));
        let id = Uuid::new_v4();

        let path = isolator.remap_download_path(dir.path(), Path::new("/"), Some(id));
        assert!(path.ends_with(format!("{}/{}/{}", ANONYMOUS_ACCOUNT, isolator.salt(), id)));
    }

    #[test]
    fn test_salt_differs_per_instance() {
        let dir = TempDir::new().unwrap();
        let (a, _) = isolator(dir.path(), true, Arc::new(NoSession));
        let (b, _) = isolator(dir.path(), true, Arc::new(NoSession));
        assert_ne!(a.salt(), b.salt());
    }

    #[test]
    fn test_disabled_returns_original_but_still_registers() {
        let dir = TempDir::new().unwrap();
        let (isolator, targets) = isolator(dir.path(), false, Arc::new(NoSession));
        let id = Uuid::new_v4();
        let original = Path::new("/cache/server/abc.zip");

        assert_eq!(isolator.remap_download_path(dir.path(), original, Some(id)), original);
        assert_eq!(targets.lookup(&id.to_string()).as_deref(), Some(original));

        let audit = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        assert!(audit.contains("[REMAP]"));
    }
}
