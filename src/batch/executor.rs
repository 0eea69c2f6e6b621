//! Fixed-size worker pool for independent remote operations
//!
//! Workers pull operations from a shared queue and send outcomes over a
//! channel to the dispatch loop, which runs inside `BatchExecutor::run`. The
//! dispatch loop owns the accumulator and is the only caller of listener
//! methods, so listeners are invoked serially even though operations run in
//! parallel. Outcomes are coalesced into one progress event per
//! `progress_interval`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::progress::{Accumulator, BatchListener, BatchProgress};
use super::retry::RetryPolicy;
use crate::s3::{ObjectEntry, S3Error, Transport};

/// One independent, idempotent remote call
#[async_trait]
pub trait BatchOperation: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Key the result is reported under
    fn key(&self) -> &str;

    async fn execute(&self) -> Result<Self::Output, S3Error>;
}

/// Fetch full metadata for one object
pub struct FetchMetadata {
    key: String,
    transport: Arc<dyn Transport>,
}

impl FetchMetadata {
    pub fn new(key: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            key: key.into(),
            transport,
        }
    }
}

#[async_trait]
impl BatchOperation for FetchMetadata {
    type Output = ObjectEntry;

    fn key(&self) -> &str {
        &self.key
    }

    async fn execute(&self) -> Result<ObjectEntry, S3Error> {
        self.transport.fetch_metadata(&self.key).await
    }
}

/// Failures of the run itself, as opposed to failures of single operations
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("Worker pool cannot start: {0}")]
    PoolStart(String),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Executor settings
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Retry policy applied per operation
    pub retry: RetryPolicy,
    /// Minimum spacing between progress events
    pub progress_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetryPolicy::default(),
            progress_interval: Duration::from_millis(250),
        }
    }
}

struct Outcome<T> {
    key: String,
    result: Result<T, S3Error>,
}

/// Runs batches of operations on a bounded worker pool
#[derive(Debug, Clone, Default)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Execute `operations` and report through `listener`.
    ///
    /// Per-operation failures never abort the batch; they end up in
    /// `BatchProgress::errors`. Cancellation is polled by workers between
    /// operations: undispatched operations are dropped and in-flight ones
    /// finish. The terminal `on_complete` event is delivered exactly once,
    /// after every progress event.
    pub async fn run<O: BatchOperation>(
        &self,
        operations: Vec<O>,
        listener: &mut dyn BatchListener<O::Output>,
        cancel: &CancellationToken,
    ) -> Result<BatchProgress<O::Output>, BatchError> {
        if self.config.workers == 0 {
            return Err(BatchError::PoolStart("worker count must be at least 1".to_string()));
        }
        if self.config.progress_interval.is_zero() {
            return Err(BatchError::PoolStart("progress interval must be non-zero".to_string()));
        }

        let total = operations.len();
        let worker_count = self.config.workers.min(total);
        info!(operations = total, workers = worker_count, "starting batch");

        let queue = Arc::new(Mutex::new(operations.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome<O::Output>>();
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let cancel = cancel.clone();
            let retry = self.config.retry.clone();

            workers.spawn(async move {
                let mut executed = 0usize;
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker_id, "cancellation observed, stopping");
                        break;
                    }
                    let next = queue
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .pop_front();
                    let Some(op) = next else { break };

                    let result = retry.run(op.key(), || op.execute()).await;
                    executed += 1;
                    let outcome = Outcome {
                        key: op.key().to_string(),
                        result,
                    };
                    if tx.send(outcome).is_err() {
                        break;
                    }
                }
                debug!(worker_id, executed, "worker finished");
            });
        }
        drop(tx);

        let mut accumulator = Accumulator::new(total);
        let mut ticker = tokio::time::interval(self.config.progress_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                outcome = rx.recv() => match outcome {
                    Some(Outcome { key, result }) => accumulator.record(key, result),
                    None => break,
                },
                _ = ticker.tick() => accumulator.flush(listener),
            }
        }

        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        let dropped = queue.lock().unwrap_or_else(PoisonError::into_inner).len();
        let cancelled = cancel.is_cancelled();
        if cancelled {
            info!(dropped, "batch cancelled, undispatched operations dropped");
        }

        let progress = accumulator.finish(cancelled, listener);
        info!(
            completed = progress.completed.len(),
            failed = progress.errors.len(),
            cancelled = progress.cancelled,
            "batch finished"
        );
        Ok(progress)
    }
}
