//! s3sync - S3 request signing, delegated URLs, batched metadata fetches
//! and local/remote reconciliation

pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod s3;
pub mod sync;

pub use config::Config;
pub use core::Core;
