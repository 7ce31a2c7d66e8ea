// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Remove every entry of the engine's server-pack cache directory.
///
/// The directory itself is kept. A missing directory counts as already clear.
/// Returns the number of entries removed.
pub fn clear_server_pack_cache(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(error) => debug!(path = %path.display(), %error, "Could not remove cached server pack"),
        }
    }

    info!(dir = %dir.display(), removed, "Cleared server pack cache");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clears_files_and_dirs() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("server");
        fs::create_dir_all(cache.join("nested")).unwrap();
        fs::write(cache.join("a.zip"), b"a").unwrap();
        fs::write(cache.join("nested").join("b.zip"), b"b").unwrap();

        assert_eq!(clear_server_pack_cache(&cache).unwrap(), 2);
        assert!(cache.is_dir());
        assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_dir_is_fine() {
        let dir = TempDir::new().unwrap();
        assert_eq!(clear_server_pack_cache(&dir.path().join("nope")).unwrap(), 0);
    }
}
