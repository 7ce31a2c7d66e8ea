// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox File Naming
//!
//! Derives filesystem-safe names for sandboxed packs and reserves unique
//! paths for them inside a shared directory.
//!
//! # Security Guarantees
//! - Names only contain `[A-Za-z0-9._-]`, never start with `.`, and are
//!   bounded in length, so peer-controlled hashes, hosts or URL paths can
//!   never escape the sandbox directory.
//! - Reservation uses `create_new`, so two concurrent downloads computing
//!   the same base name never write to the same file.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Implements sandbox file-name derivation and uniqueness

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use url::Url;

use crate::domain::context::PackContext;

/// Maximum length of a sanitized base name.
pub const MAX_BASE_NAME_LEN: usize = 64;

/// Numeric suffixes tried before falling back to a timestamp.
pub const MAX_NUMERIC_SUFFIX: u32 = 999;

/// Extension used when neither the URL nor the vanilla cache suggests one.
pub const DEFAULT_EXTENSION: &str = ".zip";

const GENERIC_NAME: &str = "pack";
const MAX_EXTENSION_LEN: usize = 5;

/// Replace anything outside `[A-Za-z0-9._-]` with `_` and bound the length.
pub fn sanitize_component(raw: &str, max_len: usize) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    trimmed.chars().take(max_len).collect()
}

/// Content hash, else canonical host, else pack id, else a generic name.
pub fn sandbox_base_name(context: &PackContext) -> String {
    let candidates = [
        context.hash.clone(),
        context.host.canonical.clone(),
        context.pack_id.map(|id| id.to_string()).unwrap_or_default(),
    ];
    candidates
        .iter()
        .map(|candidate| sanitize_component(candidate, MAX_BASE_NAME_LEN))
        .find(|name| !name.trim_matches('_').is_empty())
        .unwrap_or_else(|| GENERIC_NAME.to_string())
}

/// Plausible extension (with leading dot) from a file name, lowercased.
pub fn plausible_extension(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// Extension from the URL path, else from the known vanilla cache file, else `.zip`.
pub fn pick_extension(url: Option<&Url>, known_cache_file: Option<&Path>) -> String {
    let from_url = url
        .and_then(|u| u.path_segments())
        .and_then(|mut segments| segments.next_back())
        .and_then(plausible_extension);
    let from_cache = || {
        known_cache_file
            .and_then(|p| p.file_name())
            .and_then(|name| name.to_str())
            .and_then(plausible_extension)
    };
    from_url
        .or_else(from_cache)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Final path component of `path` if it is a normal, sanitizable name.
pub fn safe_file_name(path: &Path) -> Option<String> {
    match path.components().next_back()? {
        Component::Normal(name) => {
            let name = sanitize_component(&name.to_string_lossy(), MAX_BASE_NAME_LEN * 2);
            (!name.trim_matches('_').is_empty()).then_some(name)
        }
        _ => None,
    }
}

/// Create a new empty file `dir/base<ext>`, `dir/base-1<ext>`, ...
///
/// After [`MAX_NUMERIC_SUFFIX`] collisions a millisecond timestamp suffix is used.
pub fn reserve_unique_file(dir: &Path, base: &str, ext: &str) -> io::Result<PathBuf> {
    reserve_unique(dir, base, ext, |path| {
        OpenOptions::new().write(true).create_new(true).open(path).map(|_| ())
    })
}

/// Create a new directory `parent/base`, `parent/base-1`, ...
pub fn reserve_unique_dir(parent: &Path, base: &str) -> io::Result<PathBuf> {
    reserve_unique(parent, base, "", |path| fs::create_dir(path))
}

fn reserve_unique<F>(dir: &Path, base: &str, ext: &str, create: F) -> io::Result<PathBuf>
where
    F: Fn(&Path) -> io::Result<()>,
{
    let numbered = (0..=MAX_NUMERIC_SUFFIX).map(|n| {
        if n == 0 {
            format!("{}{}", base, ext)
        } else {
            format!("{}-{}{}", base, n, ext)
        }
    });

    for name in numbered {
        let candidate = dir.join(name);
        match create(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    let stamped = dir.join(format!(
        "{}-{}{}",
        base,
        chrono::Utc::now().timestamp_millis(),
        ext
    ));
    create(&stamped)?;
    Ok(stamped)
}
