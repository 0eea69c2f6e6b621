//! Local/remote reconciliation
//!
//! Builds a snapshot of a local directory and of a remote prefix, then
//! classifies every key into one of five disjoint sets.

pub mod diff;
pub mod local;
pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchError, BatchExecutor, BatchListener};
use crate::s3::{ObjectEntry, S3Error, Transport};

pub use diff::{diff, DiscrepancyResult};
pub use local::{build_local_map, hash_file, FileEntry};
pub use remote::{build_remote_map, relative_key};

/// Reconciliation errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// Same timestamp on both sides but different content
    #[error("Inconsistent state for {key}: {detail}")]
    InconsistentState { key: String, detail: String },

    /// Filesystem failure while reading the local tree
    #[error("Local IO error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listing the remote prefix failed
    #[error("Remote listing failed: {0}")]
    Remote(#[from] S3Error),

    /// At least one metadata fetch failed; the first failing key is reported
    #[error("Metadata fetch failed for {key}: {source}")]
    MetadataFetch {
        key: String,
        #[source]
        source: S3Error,
    },

    #[error(transparent)]
    Batch(#[from] BatchError),

    /// The blocking local scan or comparison task panicked or was aborted
    #[error("Local scan task failed: {0}")]
    LocalTask(#[from] tokio::task::JoinError),

    #[error("Reconciliation cancelled")]
    Cancelled,
}

/// Ties a transport and an executor to the snapshot and diff steps
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    executor: BatchExecutor,
}

impl Reconciler {
    pub fn new(transport: Arc<dyn Transport>, executor: BatchExecutor) -> Self {
        Self {
            transport,
            executor,
        }
    }

    pub async fn build_remote_map(
        &self,
        prefix: &str,
        listener: &mut dyn BatchListener<ObjectEntry>,
        cancel: &CancellationToken,
    ) -> Result<std::collections::BTreeMap<String, ObjectEntry>, SyncError> {
        build_remote_map(
            Arc::clone(&self.transport),
            &self.executor,
            prefix,
            listener,
            cancel,
        )
        .await
    }

    /// Snapshot both sides and classify every key
    pub async fn reconcile(
        &self,
        root: &Path,
        local_prefix: &str,
        remote_prefix: &str,
        listener: &mut dyn BatchListener<ObjectEntry>,
        cancel: &CancellationToken,
    ) -> Result<DiscrepancyResult, SyncError> {
        // Tree walk and hashing block; run them on the blocking pool
        let walk_root = root.to_path_buf();
        let walk_prefix = local_prefix.to_string();
        let local =
            tokio::task::spawn_blocking(move || build_local_map(&walk_root, &walk_prefix)).await??;
        let remote = self.build_remote_map(remote_prefix, listener, cancel).await?;
        let result = tokio::task::spawn_blocking(move || diff(&local, &remote)).await??;

        tracing::info!(
            root = %root.display(),
            remote_prefix,
            only_on_server = result.only_on_server.len(),
            only_on_client = result.only_on_client.len(),
            updated_on_server = result.updated_on_server.len(),
            updated_on_client = result.updated_on_client.len(),
            synchronized = result.synchronized.len(),
            "reconciliation finished"
        );
        Ok(result)
    }
}
