//! Single-request transport seam
//!
//! Everything above this trait (batch execution, reconciliation) is written
//! against it, so tests can substitute an in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Method, StatusCode};
use std::collections::BTreeMap;

use super::error::Result;
use super::types::{ObjectEntry, S3Object};

/// A request to be signed and sent by the transport
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    /// `/bucket/key` path, already percent-encoded, optionally with a query
    pub resource_path: String,
    /// Lower-case header names
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl SignedRequest {
    pub fn new(method: Method, resource_path: impl Into<String>) -> Self {
        Self {
            method,
            resource_path: resource_path.into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// Raw response of one request
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sign and send one request; a non-success status is returned, not raised
    async fn execute_signed(&self, request: SignedRequest) -> Result<TransportResponse>;

    /// All objects under `prefix` (every page)
    async fn list_objects(&self, prefix: &str) -> Result<Vec<S3Object>>;

    /// Full metadata for one key
    async fn fetch_metadata(&self, key: &str) -> Result<ObjectEntry>;
}
