// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Notification Queue
//!
//! Bounded FIFO of pending user alerts, decoupled from the decision path.
//! Pushing never blocks: when full, the oldest toast is dropped.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::domain::ports::ToastRenderer;

/// Maximum number of toasts waiting to be rendered.
pub const TOAST_LIMIT: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToastLevel::Info => "INFO",
            ToastLevel::Warn => "WARN",
            ToastLevel::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub title: String,
    pub body: String,
}

pub struct NotificationQueue {
    items: Mutex<VecDeque<Toast>>,
    limit: usize,
    threshold: RwLock<ToastLevel>,
}

impl NotificationQueue {
    pub fn new(threshold: ToastLevel) -> Self {
        Self::with_limit(TOAST_LIMIT, threshold)
    }

    pub fn with_limit(limit: usize, threshold: ToastLevel) -> Self {
        let limit = limit.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(limit)),
            limit,
            threshold: RwLock::new(threshold),
        }
    }

    pub fn set_threshold(&self, threshold: ToastLevel) {
        *self.threshold.write() = threshold;
    }

    /// Queue a toast. Returns `false` when it is below the verbosity threshold.
    pub fn push(&self, level: ToastLevel, title: impl Into<String>, body: impl Into<String>) -> bool {
        if level < *self.threshold.read() {
            return false;
        }

        let mut items = self.items.lock();
        while items.len() >= self.limit {
            items.pop_front();
        }
        items.push_back(Toast {
            level,
            title: title.into(),
            body: body.into(),
        });
        true
    }

    /// Remove and return every pending toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        self.items.lock().drain(..).collect()
    }

    /// Drain the queue through `renderer`. A failing item is skipped, not retried.
    pub fn flush(&self, renderer: &dyn ToastRenderer) -> usize {
        let mut rendered = 0;
        for toast in self.drain() {
            match renderer.render(&toast) {
                Ok(()) => rendered += 1,
                Err(error) => {
                    tracing::debug!(title = %toast.title, %error, "Dropping toast after render failure");
                }
            }
        }
        rendered
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(ToastLevel::Info)
    }
}
