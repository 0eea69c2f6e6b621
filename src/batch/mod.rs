//! Concurrent execution of independent remote operations
//!
//! - Bounded worker pool with per-operation retry
//! - Batched progress events delivered serially to a listener
//! - Cooperative cancellation between operations

pub mod executor;
pub mod progress;
pub mod retry;

pub use executor::{BatchConfig, BatchError, BatchExecutor, BatchOperation, FetchMetadata};
pub use progress::{BatchListener, BatchProgress, NoopListener, ProgressBatch};
pub use retry::RetryPolicy;
