//! S3 types and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata header carrying the hex MD5 of the uploaded content
pub const METADATA_MD5_HASH: &str = "x-amz-meta-md5-hash";

/// Metadata header carrying the uploader's file modification time (RFC 3339)
pub const METADATA_ORIGINAL_FILE_DATE: &str = "x-amz-meta-original-file-date";

/// S3 Object as returned by a listing (no custom metadata)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp (optional)
    pub last_modified: Option<String>,
    /// ETag (optional)
    pub etag: Option<String>,
}

impl S3Object {
    /// Create a new S3Object
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            size,
            last_modified: None,
            etag: None,
        }
    }
}

/// Response from ListObjectsV2 operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    /// List of objects
    pub contents: Vec<S3Object>,
    /// Common prefixes (subdirectories when using delimiter)
    pub common_prefixes: Vec<String>,
    /// Whether the response is truncated
    pub is_truncated: bool,
    /// Continuation token for next request
    pub next_continuation_token: Option<String>,
}

impl ListObjectsResponse {
    /// Create a new empty response
    pub fn new() -> Self {
        Self::default()
    }
}

/// Full metadata for one remote object, as fetched by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Object key as stored in the bucket
    pub key: String,
    /// Explicit content hash from `x-amz-meta-md5-hash`
    pub content_hash: Option<String>,
    /// Transport-assigned entity tag, quotes stripped
    pub etag: Option<String>,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    /// Uploader's file modification time from `x-amz-meta-original-file-date`
    pub local_file_date: Option<DateTime<Utc>>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size_bytes: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            content_hash: None,
            etag: None,
            size_bytes,
            last_modified,
            local_file_date: None,
        }
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_etag(mut self, etag: impl AsRef<str>) -> Self {
        self.etag = Some(strip_etag_quotes(etag.as_ref()).to_string());
        self
    }

    pub fn with_local_file_date(mut self, date: DateTime<Utc>) -> Self {
        self.local_file_date = Some(date);
        self
    }

    /// Hash used for comparison: the explicit hash, else the entity tag.
    ///
    /// The entity tag is only a content hash for single-part uploads, so the
    /// fallback is a weak equality check.
    pub fn comparison_hash(&self) -> Option<&str> {
        self.content_hash.as_deref().or(self.etag.as_deref())
    }

    /// Time used for the tie-break: the uploader's file date, else last-modified
    pub fn comparison_time(&self) -> DateTime<Utc> {
        self.local_file_date.unwrap_or(self.last_modified)
    }

    /// Whether this is an empty "folder marker" object
    pub fn is_folder_marker(&self) -> bool {
        self.key.ends_with('/') && self.size_bytes == 0
    }
}

/// ETags arrive quoted (`"abc"`); comparisons use the bare value
pub fn strip_etag_quotes(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}
