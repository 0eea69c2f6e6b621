//! Remote prefix snapshot, built from a listing plus per-key HEAD requests

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::SyncError;
use crate::batch::{BatchExecutor, BatchListener, FetchMetadata};
use crate::s3::{ObjectEntry, Transport};

/// Listing prefix for a remote folder: empty, or ending in exactly one `/`
pub fn normalize_remote_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Key of `key` relative to the normalized `prefix`.
///
/// Folder markers (`dir/`) map to the directory key (`dir`). Returns `None`
/// for keys outside the prefix and for the prefix's own marker, which do not
/// address an object at this level.
pub fn relative_key(key: &str, prefix: &str) -> Option<String> {
    let remainder = key.strip_prefix(prefix)?;
    let remainder = remainder.strip_suffix('/').unwrap_or(remainder);
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.to_string())
    }
}

/// List everything under `prefix` and fetch full metadata for each object.
///
/// Metadata fetches run through `executor`, reporting to `listener`. The map
/// is either complete or not returned: any per-key failure fails the whole
/// call with the first failing key.
pub async fn build_remote_map(
    transport: Arc<dyn Transport>,
    executor: &BatchExecutor,
    prefix: &str,
    listener: &mut dyn BatchListener<ObjectEntry>,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, ObjectEntry>, SyncError> {
    let prefix = normalize_remote_prefix(prefix);
    let listed = transport.list_objects(&prefix).await?;
    debug!(prefix = %prefix, listed = listed.len(), "listed remote objects");

    let mut relative_keys = BTreeMap::new();
    let mut operations = Vec::with_capacity(listed.len());
    for object in listed {
        match relative_key(&object.key, &prefix) {
            Some(relative) => {
                relative_keys.insert(object.key.clone(), relative);
                operations.push(FetchMetadata::new(object.key, Arc::clone(&transport)));
            }
            None => debug!(key = %object.key, "skipping prefix placeholder"),
        }
    }

    let progress = executor.run(operations, listener, cancel).await?;

    if let Some((key, source)) = progress.errors.into_iter().next() {
        return Err(SyncError::MetadataFetch { key, source });
    }
    if progress.cancelled {
        return Err(SyncError::Cancelled);
    }

    let mut map = BTreeMap::new();
    for (key, entry) in progress.completed {
        if let Some(relative) = relative_keys.remove(&key) {
            map.insert(relative, entry);
        }
    }
    info!(prefix = %prefix, objects = map.len(), "built remote map");
    Ok(map)
}
