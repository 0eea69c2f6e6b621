//! In-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use s3sync::s3::{ObjectEntry, S3Error, S3Object, SignedRequest, Transport, TransportResponse};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Bucket contents plus scripted failures
#[derive(Default)]
pub struct MockTransport {
    objects: BTreeMap<String, ObjectEntry>,
    /// Keys whose HEAD always fails with an authentication error
    denied: Vec<String>,
    /// Keys whose HEAD fails transiently this many times before succeeding
    flaky: Mutex<HashMap<String, usize>>,
    head_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, entry: ObjectEntry) -> Self {
        self.objects.insert(entry.key.clone(), entry);
        self
    }

    pub fn with_denied(mut self, key: &str) -> Self {
        self.denied.push(key.to_string());
        self
    }

    pub fn with_flaky(self, key: &str, failures: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(key.to_string(), failures);
        self
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute_signed(&self, _request: SignedRequest) -> Result<TransportResponse, S3Error> {
        Ok(TransportResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<S3Object>, S3Error> {
        Ok(self
            .objects
            .values()
            .filter(|entry| entry.key.starts_with(prefix))
            .map(|entry| S3Object::new(entry.key.clone(), entry.size_bytes))
            .collect())
    }

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectEntry, S3Error> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.denied.iter().any(|k| k == key) {
            return Err(S3Error::Authentication(format!("403 - {}", key)));
        }
        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(S3Error::TransientTransport(format!("503 - {}", key)));
                }
            }
        }
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| S3Error::S3Response {
                status: StatusCode::NOT_FOUND,
                message: key.to_string(),
            })
    }
}
