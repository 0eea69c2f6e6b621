//! HMAC request signer for the S3 REST dialect
//!
//! Builds the canonical string for a request (or for a delegated URL) and
//! signs it with HMAC-SHA1 keyed by the credential's secret key.
//!
//! The canonical string is:
//!
//! ```text
//! VERB\n
//! Content-MD5\n
//! Content-Type\n
//! Date-or-Expires\n
//! CanonicalizedAmzHeaders
//! CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::{BTreeMap, BTreeSet};

use super::credential::Credential;
use super::error::{Result, S3Error};

type HmacSha1 = Hmac<Sha1>;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Header namespace that takes part in signing (custom metadata lives under `x-amz-meta-`)
pub const AMZ_HEADER_PREFIX: &str = "x-amz-";

/// Custom metadata namespace
pub const AMZ_META_PREFIX: &str = "x-amz-meta-";

/// Query parameters that are part of the canonicalized resource
const SUB_RESOURCES: &[&str] = &[
    "acl",
    "delete",
    "location",
    "logging",
    "partNumber",
    "policy",
    "requestPayment",
    "torrent",
    "uploadId",
    "uploads",
    "versionId",
    "versioning",
    "versions",
    "website",
];

/// Timestamp line of the canonical string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningTime {
    /// Absolute request date, rendered as an HTTP date
    Date(DateTime<Utc>),
    /// Delegated URL expiry, in epoch seconds
    Expires(i64),
}

impl SigningTime {
    fn render(&self) -> String {
        match self {
            SigningTime::Date(date) => http_date(date),
            SigningTime::Expires(epoch) => epoch.to_string(),
        }
    }
}

/// Format a timestamp the way the `Date` header expects it
pub fn http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Deterministic signing input. Built per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest(String);

impl CanonicalRequest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Base64-encoded HMAC over a canonical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    /// Wrap a base64 signature received from elsewhere (e.g. a URL query)
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Signature escaped for use as a query parameter value
    pub fn url_escaped(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

/// Build the canonical request string.
///
/// Only `x-amz-*` headers from `headers` participate; everything else is
/// ignored. Names are lower-cased, values trimmed with whitespace runs folded,
/// repeated names merged, and the result sorted so that header order and
/// name casing never change the output.
pub fn build_canonical_request<I, K, V>(
    verb: &str,
    resource_path: &str,
    headers: I,
    content_hash: Option<&str>,
    content_type: Option<&str>,
    time: &SigningTime,
) -> Result<CanonicalRequest>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let resource = canonical_resource(resource_path)?;
    let (amz_headers, has_amz_date) = canonical_amz_headers(headers);

    // x-amz-date supersedes the Date line
    let time_line = match time {
        SigningTime::Date(_) if has_amz_date => String::new(),
        other => other.render(),
    };

    let mut out = String::with_capacity(64 + amz_headers.len() + resource.len());
    out.push_str(&verb.to_ascii_uppercase());
    out.push('\n');
    out.push_str(content_hash.unwrap_or("").trim());
    out.push('\n');
    out.push_str(content_type.unwrap_or("").trim());
    out.push('\n');
    out.push_str(&time_line);
    out.push('\n');
    out.push_str(&amz_headers);
    out.push_str(&resource);

    Ok(CanonicalRequest(out))
}

/// Sign a canonical request. Pure and deterministic.
pub fn sign(canonical: &CanonicalRequest, credential: &Credential) -> Signature {
    let mut mac = new_mac(credential);
    mac.update(canonical.as_str().as_bytes());
    Signature(BASE64.encode(mac.finalize().into_bytes()))
}

/// Check a signature against a canonical request in constant time
pub fn verify(canonical: &CanonicalRequest, credential: &Credential, signature: &Signature) -> bool {
    let Ok(raw) = BASE64.decode(signature.as_base64()) else {
        return false;
    };
    let mut mac = new_mac(credential);
    mac.update(canonical.as_str().as_bytes());
    mac.verify_slice(&raw).is_ok()
}

fn new_mac(credential: &Credential) -> HmacSha1 {
    HmacSha1::new_from_slice(credential.secret_key()).expect("HMAC can take key of any size")
}

/// Canonicalize `x-amz-*` headers. Returns the block and whether `x-amz-date` was seen.
fn canonical_amz_headers<I, K, V>(headers: I) -> (String, bool)
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut merged: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_ref().trim().to_ascii_lowercase();
        if !name.starts_with(AMZ_HEADER_PREFIX) {
            continue;
        }
        merged.entry(name).or_default().insert(fold_whitespace(value.as_ref()));
    }

    let has_amz_date = merged.contains_key("x-amz-date");
    let mut out = String::with_capacity(merged.len() * 48);
    for (name, values) in &merged {
        out.push_str(name);
        out.push(':');
        let mut first = true;
        for value in values {
            if !first {
                out.push(',');
            }
            out.push_str(value);
            first = false;
        }
        out.push('\n');
    }
    (out, has_amz_date)
}

fn fold_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `/bucket/key` plus sorted sub-resource parameters
fn canonical_resource(resource_path: &str) -> Result<String> {
    if let Some(bad) = resource_path.bytes().find(|b| b.is_ascii_control()) {
        return Err(S3Error::InvalidRequest(format!(
            "resource path contains control character 0x{:02x}",
            bad
        )));
    }
    if !resource_path.starts_with('/') {
        return Err(S3Error::InvalidRequest(format!(
            "resource path must start with '/': {}",
            resource_path
        )));
    }

    let (path, query) = match resource_path.find('?') {
        Some(pos) => (&resource_path[..pos], &resource_path[pos + 1..]),
        None => (resource_path, ""),
    };

    let mut params: Vec<(&str, Option<&str>)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.find('=') {
            Some(pos) => (&pair[..pos], Some(&pair[pos + 1..])),
            None => (pair, None),
        })
        .filter(|(name, _)| SUB_RESOURCES.contains(name) || name.starts_with("response-"))
        .collect();
    params.sort_unstable();
    params.dedup();

    let mut out = String::with_capacity(resource_path.len());
    out.push_str(path);
    for (i, (name, value)) in params.iter().enumerate() {
        out.push(if i == 0 { '?' } else { '&' });
        out.push_str(name);
        if let Some(value) = value {
            out.push('=');
            out.push_str(value);
        }
    }
    Ok(out)
}

/// Percent-encode an object key, preserving `/`
pub fn encode_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() + 16);
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                result.push(byte as char);
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

/// Resource path for an object: `/bucket/encoded-key`
pub fn resource_path(bucket: &str, key: &str) -> String {
    let mut path = String::with_capacity(bucket.len() + key.len() + 2);
    path.push('/');
    path.push_str(bucket);
    path.push('/');
    path.push_str(&encode_key(key));
    path
}

/// Signs direct (header-authenticated) requests for one credential
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credential: Credential,
}

impl RequestSigner {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Add `date` and `authorization` to a header map (lower-case names).
    ///
    /// `content-md5` and `content-type` are read from the map when present.
    pub fn sign_headers(
        &self,
        verb: &str,
        resource_path: &str,
        mut headers: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>> {
        headers.insert("date".to_string(), http_date(&now));

        let canonical = build_canonical_request(
            verb,
            resource_path,
            &headers,
            headers.get("content-md5").map(String::as_str),
            headers.get("content-type").map(String::as_str),
            &SigningTime::Date(now),
        )?;

        if std::env::var("S3SYNC_DEBUG_SIGN").is_ok() {
            tracing::debug!(canonical = %canonical.as_str(), "string to sign");
        }

        let signature = sign(&canonical, &self.credential);
        headers.insert(
            "authorization".to_string(),
            format!("AWS {}:{}", self.credential.access_id(), signature.as_base64()),
        );
        Ok(headers)
    }
}
