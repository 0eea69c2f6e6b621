//! S3 client implementation over hyper
//!
//! - HTTP/1.1 with a tuned idle pool and TCP_NODELAY
//! - native-tls (OpenSSL) for TLS
//! - Every request signed with the header HMAC dialect
//! - Single attempt per call for HEAD/GET/PUT; the batch executor owns retries.
//!   Listing does not go through the executor and retries here.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body_util::{BodyExt, Full};
use hyper::{HeaderMap, Method, Request};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use std::time::Duration;

use crate::batch::RetryPolicy;
use crate::s3::credential::Credential;
use crate::s3::error::{Result, S3Error};
use crate::s3::signer::{self, RequestSigner};
use crate::s3::transport::{SignedRequest, Transport, TransportResponse};
use crate::s3::types::{
    strip_etag_quotes, ListObjectsResponse, ObjectEntry, S3Object, METADATA_MD5_HASH,
    METADATA_ORIGINAL_FILE_DATE,
};

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// S3 client bound to one endpoint and bucket
///
/// Clone is cheap - the underlying HTTP client uses Arc internally.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: RequestSigner,
    endpoint: String,
    bucket: String,
    timeout: Duration,
    list_retry: RetryPolicy,
}

impl S3Client {
    /// Create a new S3 client
    ///
    /// Set `S3SYNC_INSECURE_TLS=1` to skip certificate verification (test setups only).
    pub fn new(endpoint: String, credential: Credential, bucket: String) -> Result<Self> {
        let insecure_tls = std::env::var("S3SYNC_INSECURE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = (if insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: Certificate verification is disabled!");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
        } else {
            TlsConnector::new()
        })
        .map_err(|e| S3Error::InvalidRequest(format!("TLS connector: {}", e)))?;

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(256)
            .set_host(true)
            .build(https);

        Ok(Self {
            client,
            signer: RequestSigner::new(credential),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            timeout: Duration::from_secs(300),
            list_retry: RetryPolicy::default(),
        })
    }

    /// Set per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the bucket name
    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = bucket;
        self
    }

    /// Retry policy used for listing pages
    pub fn with_list_retry(mut self, retry: RetryPolicy) -> Self {
        self.list_retry = retry;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credential(&self) -> &Credential {
        self.signer.credential()
    }

    /// Encode a string for use in a URL query parameter value (RFC 3986).
    fn url_encode_into(buf: &mut String, s: &str) {
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    buf.push(byte as char);
                }
                _ => {
                    buf.push('%');
                    buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
    }

    /// Resource path (with query) for one ListObjectsV2 page
    pub fn build_list_path(&self, prefix: &str, continuation_token: Option<&str>) -> String {
        let mut path = String::with_capacity(self.bucket.len() + prefix.len() + 96);
        path.push('/');
        path.push_str(&self.bucket);
        path.push_str("/?");

        if let Some(token) = continuation_token {
            path.push_str("continuation-token=");
            Self::url_encode_into(&mut path, token);
            path.push('&');
        }
        let _ = write!(path, "list-type=2&max-keys={}", 1000);
        if !prefix.is_empty() {
            path.push_str("&prefix=");
            Self::url_encode_into(&mut path, prefix);
        }
        path
    }

    async fn send(&self, request: SignedRequest) -> Result<TransportResponse> {
        let SignedRequest {
            method,
            resource_path,
            mut headers,
            body,
        } = request;

        if !body.is_empty() && !headers.contains_key("content-length") {
            headers.insert("content-length".to_string(), body.len().to_string());
        }
        let headers = self
            .signer
            .sign_headers(method.as_str(), &resource_path, headers, Utc::now())?;

        let url = format!("{}{}", self.endpoint, resource_path);
        let mut req = Request::builder().method(method.clone()).uri(&url);
        for (key, value) in headers.iter() {
            req = req.header(key, value);
        }
        let request = req.body(Full::new(body))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| S3Error::TransientTransport(format!("Request failed: {}", e)))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .collect()
                .await
                .map_err(|e| S3Error::TransientTransport(format!("Body error: {}", e)))?
                .to_bytes();
            Ok::<_, S3Error>(TransportResponse {
                status,
                headers,
                body,
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => {
                if let Ok(response) = &result {
                    tracing::debug!(%method, %url, status = %response.status, "request complete");
                }
                result
            }
            Err(_) => Err(S3Error::TransientTransport(format!(
                "{} {} timed out after {:?}",
                method, url, self.timeout
            ))),
        }
    }

    /// Send and turn any non-success status into an error
    async fn send_checked(&self, request: SignedRequest) -> Result<TransportResponse> {
        let response = self.send(request).await?;
        if !response.status.is_success() {
            let message = String::from_utf8_lossy(&response.body).to_string();
            return Err(S3Error::from_status(response.status, message));
        }
        Ok(response)
    }

    /// List one page of objects (S3 ListObjectsV2)
    pub async fn list_objects_v2(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let path = self.build_list_path(prefix, continuation_token);
        let response = self
            .list_retry
            .run(&path, || self.send_checked(SignedRequest::new(Method::GET, path.clone())))
            .await?;
        parse_list_response(&response.body)
    }

    /// Get object body
    pub async fn get_object(&self, key: &str) -> Result<Bytes> {
        let path = signer::resource_path(&self.bucket, key);
        let response = self.send_checked(SignedRequest::new(Method::GET, path)).await?;
        Ok(response.body)
    }

    /// Upload a local file, recording its hash and modification time as metadata
    /// so later reconciliations have authoritative values.
    ///
    /// Returns the ETag.
    pub async fn put_file(&self, key: &str, path: &Path) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        let modified: DateTime<Utc> = tokio::fs::metadata(path).await?.modified()?.into();
        let digest = md5::compute(&data);

        let request = SignedRequest::new(Method::PUT, signer::resource_path(&self.bucket, key))
            .header("content-type", "application/octet-stream")
            .header("content-md5", BASE64.encode(digest.0))
            .header(METADATA_MD5_HASH, hex::encode(digest.0))
            .header(
                METADATA_ORIGINAL_FILE_DATE,
                modified.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
            .body(Bytes::from(data));

        let response = self.send_checked(request).await?;
        Ok(header_str(&response.headers, "etag")
            .map(|etag| strip_etag_quotes(etag).to_string())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transport for S3Client {
    async fn execute_signed(&self, request: SignedRequest) -> Result<TransportResponse> {
        self.send(request).await
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<S3Object>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self.list_objects_v2(prefix, continuation_token.as_deref()).await?;
            objects.extend(page.contents);

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(token)) => continuation_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn fetch_metadata(&self, key: &str) -> Result<ObjectEntry> {
        let path = signer::resource_path(&self.bucket, key);
        let response = self.send_checked(SignedRequest::new(Method::HEAD, path)).await?;
        parse_head_response(key, &response.headers)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Build an ObjectEntry from HEAD response headers
pub fn parse_head_response(key: &str, headers: &HeaderMap) -> Result<ObjectEntry> {
    let last_modified = header_str(headers, "last-modified")
        .ok_or_else(|| S3Error::InvalidResponse(format!("{}: missing Last-Modified", key)))?;
    let last_modified = DateTime::parse_from_rfc2822(last_modified)
        .map_err(|e| S3Error::InvalidResponse(format!("{}: bad Last-Modified: {}", key, e)))?
        .with_timezone(&Utc);

    let size = header_str(headers, "content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let mut entry = ObjectEntry::new(key, size, last_modified);
    if let Some(etag) = header_str(headers, "etag") {
        entry = entry.with_etag(etag);
    }
    if let Some(hash) = header_str(headers, METADATA_MD5_HASH) {
        entry = entry.with_content_hash(hash.trim());
    }
    if let Some(date) = header_str(headers, METADATA_ORIGINAL_FILE_DATE) {
        match DateTime::parse_from_rfc3339(date.trim()) {
            Ok(date) => entry = entry.with_local_file_date(date.with_timezone(&Utc)),
            Err(e) => tracing::warn!(key, value = date, error = %e, "ignoring unparseable file date metadata"),
        }
    }
    Ok(entry)
}

/// Parse ListObjectsV2 XML response
///
/// Byte-slice tag matching and `std::mem::take` keep per-object allocations down.
pub fn parse_list_response(xml_data: &[u8]) -> Result<ListObjectsResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut response = ListObjectsResponse::new();
    let mut current_object: Option<S3Object> = None;
    let mut current_text = String::with_capacity(256);
    let mut in_common_prefixes = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"Contents" => {
                    current_object = Some(S3Object::new(String::new(), 0));
                }
                b"CommonPrefixes" => {
                    in_common_prefixes = true;
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(ref mut obj) = current_object {
                            obj.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(ref mut obj) = current_object {
                            obj.size = current_text.parse().unwrap_or(0);
                        }
                    }
                    b"LastModified" => {
                        if let Some(ref mut obj) = current_object {
                            obj.last_modified = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"ETag" => {
                        if let Some(ref mut obj) = current_object {
                            obj.etag = Some(strip_etag_quotes(&current_text).to_string());
                        }
                    }
                    b"Contents" => {
                        if let Some(obj) = current_object.take() {
                            response.contents.push(obj);
                        }
                    }
                    b"CommonPrefixes" => {
                        in_common_prefixes = false;
                    }
                    b"Prefix" => {
                        if in_common_prefixes {
                            response
                                .common_prefixes
                                .push(std::mem::take(&mut current_text));
                        }
                    }
                    b"IsTruncated" => {
                        response.is_truncated = current_text == "true";
                    }
                    b"NextContinuationToken" => {
                        response.next_continuation_token = Some(std::mem::take(&mut current_text));
                    }
                    _ => {}
                }

                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(S3Error::XmlParse(e.to_string()));
            }
            _ => {}
        }
    }

    Ok(response)
}
