//! Local directory snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::SyncError;

/// One file or directory under the reconciliation root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Path relative to the root, `/`-separated, with the key prefix prepended
    pub relative_key: String,
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    pub size_bytes: u64,
    pub mtime: DateTime<Utc>,
}

/// Normalize a key prefix: empty stays empty, otherwise it ends with `/`
pub fn normalize_local_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}

/// Walk `root` depth-first and key every file and directory below it.
///
/// The root itself is not included. Any filesystem error aborts the walk.
pub fn build_local_map(root: &Path, prefix: &str) -> Result<BTreeMap<String, FileEntry>, SyncError> {
    let prefix = normalize_local_prefix(prefix);
    let mut map = BTreeMap::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
            SyncError::LocalIo { path, source }
        })?;
        let path = entry.path();
        let metadata = entry.metadata().map_err(|e| SyncError::LocalIo {
            path: path.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("metadata unavailable")),
        })?;
        let modified = metadata.modified().map_err(|source| SyncError::LocalIo {
            path: path.to_path_buf(),
            source,
        })?;

        let relative = path.strip_prefix(root).map_err(|_| SyncError::LocalIo {
            path: path.to_path_buf(),
            source: std::io::Error::other("path escapes the root directory"),
        })?;
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let relative_key = format!("{}{}", prefix, components.join("/"));

        map.insert(
            relative_key.clone(),
            FileEntry {
                relative_key,
                absolute_path: path.to_path_buf(),
                is_directory: metadata.is_dir(),
                size_bytes: if metadata.is_dir() { 0 } else { metadata.len() },
                mtime: DateTime::<Utc>::from(modified),
            },
        );
    }

    tracing::debug!(root = %root.display(), entries = map.len(), "built local map");
    Ok(map)
}

/// Hex MD5 of a file's content, read in chunks
pub fn hash_file(path: &Path) -> Result<String, SyncError> {
    let io_err = |source| SyncError::LocalIo {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut context = md5::Context::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
    }
    Ok(hex::encode(context.compute().0))
}
