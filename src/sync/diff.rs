//! Classification of a local snapshot against a remote snapshot

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::local::{hash_file, FileEntry};
use super::SyncError;
use crate::s3::ObjectEntry;

/// Outcome of a comparison; every key of either side is in exactly one set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscrepancyResult {
    pub only_on_server: BTreeSet<String>,
    pub only_on_client: BTreeSet<String>,
    pub updated_on_server: BTreeSet<String>,
    pub updated_on_client: BTreeSet<String>,
    pub synchronized: BTreeSet<String>,
}

impl DiscrepancyResult {
    /// Total number of classified keys
    pub fn len(&self) -> usize {
        self.only_on_server.len()
            + self.only_on_client.len()
            + self.updated_on_server.len()
            + self.updated_on_client.len()
            + self.synchronized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` was classified at all
    pub fn contains(&self, key: &str) -> bool {
        self.only_on_server.contains(key)
            || self.only_on_client.contains(key)
            || self.updated_on_server.contains(key)
            || self.updated_on_client.contains(key)
            || self.synchronized.contains(key)
    }

    /// Whether both sides already agree on every key
    pub fn is_in_sync(&self) -> bool {
        self.synchronized.len() == self.len()
    }
}

/// Remote hash for comparison, warning when only the entity tag is available
fn remote_hash(remote: &ObjectEntry) -> Option<&str> {
    if remote.content_hash.is_none() {
        warn!(
            key = %remote.key,
            "no stored md5 metadata, comparing against the ETag"
        );
    }
    remote.comparison_hash()
}

/// Classify every key of `local` and `remote`.
///
/// Directories present on both sides are synchronized. Files with equal
/// hashes are synchronized regardless of time. Otherwise the newer side wins
/// at millisecond precision; equal times with different content fail with
/// `InconsistentState`.
pub fn diff(
    local: &BTreeMap<String, FileEntry>,
    remote: &BTreeMap<String, ObjectEntry>,
) -> Result<DiscrepancyResult, SyncError> {
    let mut result = DiscrepancyResult::default();

    for (key, object) in remote {
        let Some(file) = local.get(key) else {
            result.only_on_server.insert(key.clone());
            continue;
        };

        if file.is_directory {
            result.synchronized.insert(key.clone());
            continue;
        }

        let local_hash = hash_file(&file.absolute_path)?;
        if remote_hash(object).is_some_and(|hash| hash.eq_ignore_ascii_case(&local_hash)) {
            result.synchronized.insert(key.clone());
            continue;
        }

        if object.local_file_date.is_none() {
            warn!(
                key = %key,
                "no original file date metadata, comparing against last-modified; clocks may disagree"
            );
        }
        let remote_time = object.comparison_time().timestamp_millis();
        let local_time = file.mtime.timestamp_millis();
        match remote_time.cmp(&local_time) {
            Ordering::Greater => result.updated_on_server.insert(key.clone()),
            Ordering::Less => result.updated_on_client.insert(key.clone()),
            Ordering::Equal => {
                return Err(SyncError::InconsistentState {
                    key: key.clone(),
                    detail: format!(
                        "local file and remote object share timestamp {} but have different hashes",
                        local_time
                    ),
                });
            }
        };
    }

    for key in local.keys() {
        if !result.contains(key) {
            result.only_on_client.insert(key.clone());
        }
    }

    Ok(result)
}
