// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fingerprint Detector
//!
//! Tracks a sliding window of request timestamps per origin and raises at
//! most one alert per window when an origin pushes `threshold` or more
//! pack requests inside it. Origins with nothing left in the window are
//! swept periodically, and the number of tracked origins is capped.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements repeated-request fingerprinting detection

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Maximum number of origins with a live history.
pub const ORIGIN_LIMIT: usize = 1024;

/// Idle histories are swept every this many recorded requests.
const SWEEP_INTERVAL: u64 = 256;

/// Request timestamps for one origin plus the time of its last alert.
#[derive(Debug, Default)]
pub struct PackHistory {
    timestamps: VecDeque<i64>,
    last_alert: Option<i64>,
}

impl PackHistory {
    fn prune(&mut self, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        while self.timestamps.front().is_some_and(|&ts| ts < cutoff) {
            self.timestamps.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn newest(&self) -> i64 {
        self.timestamps.iter().copied().max().unwrap_or(i64::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintAlert {
    pub origin: String,
    pub count: usize,
    pub window_ms: i64,
    pub at_ms: i64,
}

pub struct FingerprintDetector {
    threshold: AtomicUsize,
    window_ms: AtomicI64,
    histories: DashMap<String, Arc<Mutex<PackHistory>>>,
    recorded: AtomicU64,
}

impl FingerprintDetector {
    /// `threshold == 0` disables alerts.
    pub fn new(threshold: usize, window_ms: u64) -> Self {
        Self {
            threshold: AtomicUsize::new(threshold),
            window_ms: AtomicI64::new(clamp_window(window_ms)),
            histories: DashMap::new(),
            recorded: AtomicU64::new(0),
        }
    }

    pub fn reconfigure(&self, threshold: usize, window_ms: u64) {
        self.threshold.store(threshold, Ordering::Relaxed);
        self.window_ms.store(clamp_window(window_ms), Ordering::Relaxed);
    }

    /// Record one request from `origin` at `now_ms`.
    pub fn record(&self, origin: &str, now_ms: i64) -> Option<FingerprintAlert> {
        let recorded = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        let threshold = self.threshold.load(Ordering::Relaxed);
        let window_ms = self.window_ms.load(Ordering::Relaxed);

        let alert = self.record_in_window(origin, now_ms, threshold, window_ms);

        if recorded % SWEEP_INTERVAL == 0 || self.histories.len() > ORIGIN_LIMIT {
            self.sweep(now_ms, window_ms);
        }
        alert
    }

    fn record_in_window(
        &self,
        origin: &str,
        now_ms: i64,
        threshold: usize,
        window_ms: i64,
    ) -> Option<FingerprintAlert> {
        // Clone the per-origin handle so the map shard lock is not held
        // while the history is mutated.
        let history = self
            .histories
            .entry(origin.to_string())
            .or_default()
            .clone();
        let mut history = history.lock();

        history.timestamps.push_back(now_ms);
        history.prune(now_ms, window_ms);

        if threshold == 0 || history.len() < threshold {
            return None;
        }

        let quiet_long_enough = history
            .last_alert
            .map(|last| now_ms.saturating_sub(last) >= window_ms)
            .unwrap_or(true);
        if !quiet_long_enough {
            return None;
        }

        history.last_alert = Some(now_ms);
        Some(FingerprintAlert {
            origin: origin.to_string(),
            count: history.len(),
            window_ms,
            at_ms: now_ms,
        })
    }

    /// Drop origins with an empty window, then the stalest ones over the cap.
    ///
    /// A history whose window is empty also has its last alert outside the
    /// window, so dropping it never re-arms an alert early.
    fn sweep(&self, now_ms: i64, window_ms: i64) {
        self.histories.retain(|_, history| {
            let mut history = history.lock();
            history.prune(now_ms, window_ms);
            !history.is_empty()
        });

        let excess = self.histories.len().saturating_sub(ORIGIN_LIMIT);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(String, i64)> = self
            .histories
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().newest()))
            .collect();
        by_age.sort_by_key(|(_, newest)| *newest);
        for (origin, _) in by_age.into_iter().take(excess) {
            self.histories.remove(&origin);
        }
    }

    /// Number of `record` calls since creation.
    pub fn recorded_events(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    /// Requests currently inside the window for `origin`.
    pub fn window_size(&self, origin: &str) -> usize {
        self.histories
            .get(origin)
            .map(|entry| entry.value().lock().len())
            .unwrap_or(0)
    }

    pub fn tracked_origins(&self) -> usize {
        self.histories.len()
    }

    pub fn clear(&self) {
        self.histories.clear();
    }
}

fn clamp_window(window_ms: u64) -> i64 {
    i64::try_from(window_ms).unwrap_or(i64::MAX)
}
