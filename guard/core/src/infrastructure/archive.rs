// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Sandbox archive extraction.
//!
//! Unpacks a sandboxed `.zip` next to itself into `<stem>-extracted[-N]/`.
//! Entries whose names would resolve outside that directory are skipped, and
//! the entry count and total unpacked size are capped by [`ExtractionLimits`].

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::file_naming::{reserve_unique_dir, sanitize_component, MAX_BASE_NAME_LEN};

const EXTRACTED_SUFFIX: &str = "-extracted";

/// Default cap on the bytes written by one extraction.
pub const MAX_EXTRACTED_BYTES: u64 = 512 * 1024 * 1024;

/// Default cap on the entries of one archive.
pub const MAX_ARCHIVE_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionLimits {
    pub max_entries: usize,
    pub max_total_bytes: u64,
}

impl Default for ExtractionLimits {
    fn default() -> Self {
        Self {
            max_entries: MAX_ARCHIVE_ENTRIES,
            max_total_bytes: MAX_EXTRACTED_BYTES,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not a zip archive: {0}")]
    NotAnArchive(PathBuf),

    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive has {count} entries, limit is {limit}")]
    TooManyEntries { count: usize, limit: usize },

    #[error("archive unpacks to more than {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub directory: PathBuf,
    pub files: usize,
    pub skipped: usize,
}

/// Whether `path` looks like something [`extract_zip`] can unpack.
pub fn is_zip_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Extract `archive` into a freshly reserved sibling directory.
pub fn extract_zip(archive: &Path) -> Result<Extraction, ArchiveError> {
    extract_zip_with_limits(archive, ExtractionLimits::default())
}

/// Extract with explicit limits. On any failure the partially populated
/// directory is removed.
pub fn extract_zip_with_limits(
    archive: &Path,
    limits: ExtractionLimits,
) -> Result<Extraction, ArchiveError> {
    if !is_zip_archive(archive) {
        return Err(ArchiveError::NotAnArchive(archive.to_path_buf()));
    }

    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    if zip.len() > limits.max_entries {
        return Err(ArchiveError::TooManyEntries {
            count: zip.len(),
            limit: limits.max_entries,
        });
    }

    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    let stem = archive
        .file_stem()
        .map(|s| sanitize_component(&s.to_string_lossy(), MAX_BASE_NAME_LEN))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "pack".to_string());
    let directory = reserve_unique_dir(parent, &format!("{}{}", stem, EXTRACTED_SUFFIX))?;

    match unpack(&mut zip, archive, &directory, limits) {
        Ok((files, skipped)) => {
            debug!(archive = %archive.display(), directory = %directory.display(), files, skipped, "Archive extracted");
            Ok(Extraction {
                directory,
                files,
                skipped,
            })
        }
        Err(error) => {
            if let Err(cleanup) = fs::remove_dir_all(&directory) {
                debug!(directory = %directory.display(), error = %cleanup, "Could not remove partial extraction");
            }
            Err(error)
        }
    }
}

fn unpack(
    zip: &mut zip::ZipArchive<File>,
    archive: &Path,
    directory: &Path,
    limits: ExtractionLimits,
) -> Result<(usize, usize), ArchiveError> {
    let too_large = || ArchiveError::TooLarge {
        limit: limits.max_total_bytes,
    };
    let mut written: u64 = 0;
    let mut files = 0;
    let mut skipped = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), archive = %archive.display(), "Skipping archive entry outside extraction root");
            skipped += 1;
            continue;
        };
        let out_path = directory.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        let remaining = limits.max_total_bytes.saturating_sub(written);
        if entry.size() > remaining {
            return Err(too_large());
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        // declared sizes can lie, so the copy itself is bounded too
        let copied = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out_file)?;
        if copied > remaining {
            return Err(too_large());
        }
        written += copied;
        files += 1;
    }

    Ok((files, skipped))
}
