use anyhow::{Context, Result};
use std::sync::Arc;

use crate::batch::BatchExecutor;
use crate::config::{Config, Profile};
use crate::s3::{Credential, DelegatedUrlFactory, S3Client, Transport};
use crate::sync::Reconciler;

/// Core shared by every CLI command
///
/// The S3Client is created once and shared. Clones share the same underlying
/// HTTP connection pool, so listing, HEAD fan-out and uploads reuse
/// connections.
#[derive(Clone)]
pub struct Core {
    pub config: Arc<Config>,
    pub executor: BatchExecutor,
    pub url_factory: DelegatedUrlFactory,
    credential: Credential,
    /// Shared S3 client - clones share the same HTTP connection pool
    s3_client_shared: S3Client,
}

impl Core {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let profile: &Profile = config
            .get_profile(None)
            .ok_or_else(|| anyhow::anyhow!("No profile found in configuration"))?;

        let credential = Credential::new(profile.access_key.clone(), profile.secret_key.as_bytes());
        let url_factory = DelegatedUrlFactory::new(profile.endpoint.clone());
        let executor = BatchExecutor::new(config.batch.batch_config());

        let s3_client_shared = S3Client::new(
            profile.endpoint.clone(),
            credential.clone(),
            profile.bucket.clone().unwrap_or_default(),
        )
        .context("Failed to create S3 client")?
        .with_timeout(config.batch.request_timeout())
        .with_list_retry(config.batch.retry_policy());

        tracing::debug!(
            endpoint = %profile.endpoint,
            access_key = %profile.access_key,
            workers = config.batch.workers,
            "core initialized"
        );

        Ok(Self {
            config,
            executor,
            url_factory,
            credential,
            s3_client_shared,
        })
    }

    /// Get a clone of the shared S3 client (shares connection pool)
    pub fn s3_client(&self) -> S3Client {
        self.s3_client_shared.clone()
    }

    /// Shared client bound to `bucket`
    pub fn s3_client_for(&self, bucket: &str) -> S3Client {
        self.s3_client_shared.clone().with_bucket(bucket.to_string())
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Reconciler for `bucket`, running metadata fetches on the shared executor
    pub fn reconciler(&self, bucket: &str) -> Reconciler {
        let transport: Arc<dyn Transport> = Arc::new(self.s3_client_for(bucket));
        Reconciler::new(transport, self.executor.clone())
    }
}
