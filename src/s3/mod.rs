//! S3 client module with request signing and delegated URLs
//!
//! This module provides:
//! - HMAC-SHA1 request signing and verification
//! - Time-bounded pre-signed GET/PUT URLs
//! - The transport seam used by batch execution, and its HTTP implementation
//! - Type-safe object listings and metadata

pub mod client;
pub mod credential;
pub mod error;
pub mod presign;
pub mod signer;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::S3Client;
pub use credential::Credential;
pub use error::{Result, S3Error};
pub use presign::{is_expired, BoundMetadata, DelegatedUrl, DelegatedUrlFactory, PresentedRequest};
pub use signer::{
    build_canonical_request, resource_path, sign, verify, CanonicalRequest, RequestSigner,
    Signature, SigningTime,
};
pub use transport::{SignedRequest, Transport, TransportResponse};
pub use types::{ListObjectsResponse, ObjectEntry, S3Object};
