// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pack Audit Log
//!
//! Append-only, feature-gated record of every fresh decision, fingerprint
//! alert, path remap and sandbox operation. One line per event:
//!
//! ```text
//! 2026-01-01T00:00:00.000Z [BLOCK] host=... ip=... remote=... packId=... cacheKey=... url=... hash=... required=... prompt="..." extra
//! ```
//!
//! Field values come from the server and are escaped so that one event can
//! never span or forge a second line. Write failures are logged at debug
//! level and never propagate.

use chrono::{SecondsFormat, Utc};
use std::borrow::Cow;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::domain::context::PackContext;

const EMPTY_FIELD: &str = "-";

pub struct AuditLog {
    path: PathBuf,
    enabled: AtomicBool,
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled: AtomicBool::new(enabled),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Append one event. Silently skipped when disabled or unwritable.
    pub fn record(&self, action: &str, context: Option<&PackContext>, extra: Option<&str>) {
        if !self.is_enabled() {
            return;
        }

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format_line(&timestamp, action, context, extra);
        if let Err(error) = self.append(&line) {
            debug!(path = %self.path.display(), %error, "Audit log write skipped");
        }
    }

    fn append(&self, line: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// Render one audit line.
pub fn format_line(
    timestamp: &str,
    action: &str,
    context: Option<&PackContext>,
    extra: Option<&str>,
) -> String {
    let mut line = format!("{} [{}]", timestamp, action);

    match context {
        Some(ctx) => {
            let pack_id = ctx.pack_id.map(|id| id.to_string()).unwrap_or_default();
            let fields = [
                ("host", ctx.host.display_name()),
                ("ip", ctx.host.ip.as_str()),
                ("remote", ctx.host.remote.as_str()),
                ("packId", pack_id.as_str()),
                ("cacheKey", ctx.cache_key.as_deref().unwrap_or_default()),
                ("url", ctx.url.as_str()),
                ("hash", ctx.hash.as_str()),
            ];
            for (name, value) in fields {
                line.push_str(&format!(" {}={}", name, field(value)));
            }
            line.push_str(&format!(" required={}", ctx.required));
            if ctx.has_prompt() {
                line.push_str(&format!(" prompt=\"{}\"", escape_controls(&ctx.prompt.replace('"', "'"))));
            }
        }
        None => line.push_str(" host=<unknown>"),
    }

    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        line.push(' ');
        line.push_str(&escape_controls(&extra.replace(['\r', '\n'], " ")));
    }

    line
}

/// Unquoted `name=value` field: controls escaped, whitespace percent-encoded.
fn field(value: &str) -> Cow<'_, str> {
    if value.is_empty() {
        return Cow::Borrowed(EMPTY_FIELD);
    }
    if !value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else if c.is_whitespace() {
            escaped.push_str("%20");
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

fn escape_controls(value: &str) -> Cow<'_, str> {
    if !value.chars().any(char::is_control) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::HostInfo;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn context() -> PackContext {
        PackContext {
            url: "http://example.com/pack.zip".to_string(),
            hash: "abc".to_string(),
            host: HostInfo {
                host: "example.com".to_string(),
                canonical: "example.com".to_string(),
                ip: "93.184.215.14".to_string(),
                ..HostInfo::default()
            },
            required: true,
            cache_key: Some("hash:example.com|abc".to_string()),
            pack_id: Some(Uuid::nil()),
            prompt: "Say \"yes\"".to_string(),
        }
    }

    #[test]
    fn test_format_line_shape() {
        let line = format_line("T", "BLOCK", Some(&context()), Some("reason=Policy"));
        assert_eq!(
            line,
            "T [BLOCK] host=example.com ip=93.184.215.14 remote=- \
             packId=00000000-0000-0000-0000-000000000000 cacheKey=hash:example.com|abc \
             url=http://example.com/pack.zip hash=abc required=true prompt=\"Say 'yes'\" reason=Policy"
        );
    }

    #[test]
    fn test_format_line_without_context() {
        assert_eq!(
            format_line("T", "REMAP", None, Some("path=/x\n/y")),
            "T [REMAP] host=<unknown> path=/x /y"
        );
    }

    #[test]
    fn test_injected_newlines_stay_on_one_line() {
        let mut ctx = context();
        ctx.url = "https://example.com/p.zip\n2026-01-01T00:00:00.000Z [ALLOW] host=forged".to_string();
        ctx.hash = "aa\nbb".to_string();
        ctx.host.remote = "1.2.3.4:5\r\n".to_string();
        ctx.prompt = "line one\u{1b}[2J".to_string();

        let line = format_line("T", "BLOCK", Some(&ctx), Some("reason=x\ty"));
        assert_eq!(line.lines().count(), 1);
        assert!(!line.chars().any(|c| c.is_control()));
        assert!(line.contains(" url=https://example.com/p.zip\\n2026-01-01T00:00:00.000Z%20[ALLOW]%20host=forged "));
        assert!(line.contains(" hash=aa\\nbb "));
        assert!(line.contains(" remote=1.2.3.4:5\\r\\n "));
        assert!(line.ends_with("reason=x\\ty"));
    }

    #[test]
    fn test_record_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("nested").join("audit.log"), true);
        log.record("ALLOW", Some(&context()), None);
        log.record("SANDBOX", Some(&context()), Some("target=/tmp/x.zip"));

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[ALLOW]"));
        assert!(lines[1].ends_with("target=/tmp/x.zip"));
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"), false);
        log.record("ALLOW", Some(&context()), None);
        assert!(!log.path().exists());
    }

    #[test]
    fn test_unwritable_log_is_swallowed() {
        let dir = TempDir::new().unwrap();
        // a directory in place of the file makes every append fail
        let log = AuditLog::new(dir.path(), true);
        log.record("ALLOW", Some(&context()), None);
    }
}
