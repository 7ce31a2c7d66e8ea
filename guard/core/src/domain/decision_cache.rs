// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decision Cache
//!
//! Bounded, access-ordered map from cache key to the decision already made
//! for that pack identity in the current session. Hits bypass the policy
//! engine and every side effect attached to a fresh decision.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::domain::decision::Decision;

/// Maximum number of cached decisions per session.
pub const CACHE_LIMIT: usize = 256;

pub struct DecisionCache {
    entries: Mutex<LruCache<String, Decision>>,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_LIMIT)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a decision, marking the key most recently used.
    pub fn get(&self, key: &str) -> Option<Decision> {
        self.entries.lock().get(key).copied()
    }

    /// Insert or refresh a decision, evicting the least recently used key on overflow.
    pub fn put(&self, key: impl Into<String>, decision: Decision) {
        self.entries.lock().put(key.into(), decision);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new()
    }
}
