// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cached-Pack Copier
//!
//! Used when a request carries no URL: the engine downloads the pack through
//! its own path (registered by the cache-path isolator) and this copier waits
//! for that file to settle before copying it into the sandbox.
//!
//! The wait is a blocking poll loop; run it on `spawn_blocking`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::config::DownloadConfig;
use crate::infrastructure::registry::DownloadTargetRegistry;

#[derive(Clone)]
pub struct CachedPackCopier {
    targets: Arc<DownloadTargetRegistry>,
    interval: Duration,
    deadline: Duration,
}

impl CachedPackCopier {
    pub fn new(targets: Arc<DownloadTargetRegistry>, interval: Duration, deadline: Duration) -> Self {
        Self {
            targets,
            interval: interval.max(Duration::from_millis(1)),
            deadline,
        }
    }

    pub fn from_config(targets: Arc<DownloadTargetRegistry>, config: &DownloadConfig) -> Self {
        Self::new(
            targets,
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.poll_deadline_ms),
        )
    }

    /// Wait for the download registered under `key` to stop growing, then copy it to `dest`.
    ///
    /// Returns `Ok(None)` when the deadline passes without a stable file.
    /// An I/O error seen while polling is only returned if nothing succeeded.
    pub fn copy_when_stable(&self, key: &str, dest: &Path) -> io::Result<Option<PathBuf>> {
        let started = Instant::now();
        let mut last_size: Option<u64> = None;
        let mut last_error: Option<io::Error> = None;

        loop {
            if let Some(source) = self.targets.lookup(key) {
                match fs::metadata(&source) {
                    Ok(meta) if meta.is_file() => {
                        let size = meta.len();
                        if size > 0 && last_size == Some(size) {
                            match copy_into(&source, dest) {
                                Ok(path) => {
                                    debug!(source = %source.display(), dest = %path.display(), bytes = size, "Copied cached pack");
                                    return Ok(Some(path));
                                }
                                Err(error) => last_error = Some(error),
                            }
                        }
                        last_size = Some(size);
                    }
                    Ok(_) => last_size = None,
                    Err(error) if error.kind() == io::ErrorKind::NotFound => last_size = None,
                    Err(error) => {
                        last_size = None;
                        last_error = Some(error);
                    }
                }
            }

            if started.elapsed() >= self.deadline {
                break;
            }
            thread::sleep(self.interval);
        }

        match last_error {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

fn copy_into(source: &Path, dest: &Path) -> io::Result<PathBuf> {
    fs::copy(source, dest)?;
    std::path::absolute(dest)
}
