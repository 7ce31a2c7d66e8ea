// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Session Registries
//!
//! Shared lookup tables that connect the synchronous decision path with
//! asynchronous work started from it:
//! - [`ContextRegistry`]: pack id → context, for callbacks that only carry the id
//! - [`DownloadTargetRegistry`]: context key → path the engine is downloading to
//! - [`SnapshotDedupe`]: keys with a prompt-inspection download in flight
//!
//! All three are internally synchronized and safe to share across worker threads.
//! The context and target tables are bounded and evict least recently used
//! entries, so a server pushing fresh pack ids cannot grow them without limit.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements process-wide, session-scoped lookup state

use dashmap::DashSet;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::context::PackContext;

/// Maximum number of pack contexts tracked per session.
pub const CONTEXT_LIMIT: usize = 256;

/// Maximum number of engine download targets tracked per session.
pub const TARGET_LIMIT: usize = 256;

fn bounded<K: std::hash::Hash + Eq, V>(capacity: usize) -> LruCache<K, V> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

/// Contexts awaiting completion, indexed by pack id.
#[derive(Clone)]
pub struct ContextRegistry {
    contexts: Arc<Mutex<LruCache<Uuid, Arc<PackContext>>>>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::with_capacity(CONTEXT_LIMIT)
    }
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contexts: Arc::new(Mutex::new(bounded(capacity))),
        }
    }

    /// Register a context. Contexts without a pack id are not tracked.
    pub fn register(&self, context: &Arc<PackContext>) -> bool {
        match context.pack_id {
            Some(pack_id) => {
                if let Some((evicted, _)) = self.contexts.lock().push(pack_id, context.clone()) {
                    if evicted != pack_id {
                        debug!("Evicted pack context: pack_id={}", evicted);
                    }
                }
                debug!("Registered pack context: pack_id={}", pack_id);
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, pack_id: Uuid) -> Option<Arc<PackContext>> {
        self.contexts.lock().get(&pack_id).cloned()
    }

    /// Drop the context once its request is fully handled.
    pub fn mark_handled(&self, context: &PackContext) {
        if let Some(pack_id) = context.pack_id {
            if self.contexts.lock().pop(&pack_id).is_some() {
                debug!("Pack context handled: pack_id={}", pack_id);
            }
        }
    }

    pub fn count(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn clear(&self) {
        self.contexts.lock().clear();
    }
}

/// Where the engine's own downloader is writing each pack.
pub struct DownloadTargetRegistry {
    targets: Mutex<LruCache<String, PathBuf>>,
}

impl Default for DownloadTargetRegistry {
    fn default() -> Self {
        Self::with_capacity(TARGET_LIMIT)
    }
}

impl DownloadTargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            targets: Mutex::new(bounded(capacity)),
        }
    }

    pub fn register(&self, key: impl Into<String>, path: impl AsRef<Path>) {
        self.targets.lock().put(key.into(), path.as_ref().to_path_buf());
    }

    /// Look up a target, marking it most recently used.
    pub fn lookup(&self, key: &str) -> Option<PathBuf> {
        self.targets.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<PathBuf> {
        self.targets.lock().pop(key)
    }

    pub fn count(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn clear(&self) {
        self.targets.lock().clear();
    }
}

/// Keys of prompt-inspection snapshots currently in flight.
#[derive(Default)]
pub struct SnapshotDedupe {
    in_flight: DashSet<String>,
}

impl SnapshotDedupe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `false` when a snapshot for it is already running.
    pub fn try_acquire(&self, key: &str) -> bool {
        self.in_flight.insert(key.to_string())
    }

    pub fn release(&self, key: &str) {
        self.in_flight.remove(key);
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    pub fn count(&self) -> usize {
        self.in_flight.len()
    }
}
