//! Time-bounded delegated (pre-signed) URLs
//!
//! A delegated URL carries `AWSAccessKeyId`, `Expires` and `Signature` query
//! parameters so the holder can perform one operation without credentials.
//! PUT URLs are additionally bound to a content type and a set of custom
//! headers: those values are part of the signed string, so the server rejects
//! any upload that presents different ones.

use std::collections::BTreeMap;

use super::credential::Credential;
use super::error::{Result, S3Error};
use super::signer::{
    self, build_canonical_request, Signature, SigningTime, AMZ_HEADER_PREFIX, AMZ_META_PREFIX,
};

/// Metadata a PUT URL is cryptographically bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundMetadata {
    pub content_type: String,
    /// Lower-case `x-amz-*` header names to values
    pub headers: BTreeMap<String, String>,
}

/// A client-minted URL granting one operation until `expiry_epoch_seconds`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedUrl {
    pub verb: String,
    /// Endpoint plus resource path, without the auth query
    pub target_url: String,
    pub resource_path: String,
    pub access_id: String,
    pub expiry_epoch_seconds: i64,
    pub signature: Signature,
    pub bound_metadata: Option<BoundMetadata>,
}

impl DelegatedUrl {
    /// Full URL including the auth query parameters
    pub fn url(&self) -> String {
        let separator = if self.target_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}AWSAccessKeyId={}&Expires={}&Signature={}",
            self.target_url,
            separator,
            urlencoding::encode(&self.access_id),
            self.expiry_epoch_seconds,
            self.signature.url_escaped()
        )
    }

    /// The request that this URL was minted for, as a consumer must present it
    pub fn presented_request(&self) -> PresentedRequest {
        let (content_type, headers) = match &self.bound_metadata {
            Some(bound) => (Some(bound.content_type.clone()), bound.headers.clone()),
            None => (None, BTreeMap::new()),
        };
        PresentedRequest {
            verb: self.verb.clone(),
            resource_path: self.resource_path.clone(),
            content_type,
            headers,
        }
    }

    /// Recover a delegated URL from its string form.
    ///
    /// The verb is not encoded in the URL and must be supplied. Bound metadata
    /// cannot be recovered; it travels as request headers.
    pub fn parse(verb: &str, url: &str) -> Result<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| S3Error::InvalidRequest(format!("invalid delegated URL: {}", e)))?;

        let mut access_id = None;
        let mut expires = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "AWSAccessKeyId" => access_id = Some(value.into_owned()),
                "Expires" => expires = Some(value.into_owned()),
                "Signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        let missing = |name: &str| S3Error::InvalidRequest(format!("delegated URL lacks {}", name));
        let access_id = access_id.ok_or_else(|| missing("AWSAccessKeyId"))?;
        let expires = expires.ok_or_else(|| missing("Expires"))?;
        let signature = signature.ok_or_else(|| missing("Signature"))?;
        let expiry_epoch_seconds = expires
            .parse::<i64>()
            .map_err(|_| S3Error::InvalidRequest(format!("invalid Expires value: {}", expires)))?;

        // Sub-resource values are signed in their encoded form, so keep them raw
        let mut resource_path = parsed.path().to_string();
        let raw_params = parsed
            .query()
            .unwrap_or("")
            .split('&')
            .filter(|pair| !pair.is_empty() && !is_auth_param(pair));
        for (i, pair) in raw_params.enumerate() {
            resource_path.push(if i == 0 { '?' } else { '&' });
            resource_path.push_str(pair);
        }

        let origin = parsed.origin().ascii_serialization();
        Ok(Self {
            verb: verb.to_ascii_uppercase(),
            target_url: format!("{}{}", origin, resource_path),
            resource_path,
            access_id,
            expiry_epoch_seconds,
            signature: Signature::from_base64(signature),
            bound_metadata: None,
        })
    }
}

/// What a consumer actually sends when using a delegated URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedRequest {
    pub verb: String,
    pub resource_path: String,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Pure expiry check: a URL is expired from its expiry second onwards
pub fn is_expired(url: &DelegatedUrl, now_epoch: i64) -> bool {
    now_epoch >= url.expiry_epoch_seconds
}

/// Mints delegated URLs against one endpoint
#[derive(Debug, Clone)]
pub struct DelegatedUrlFactory {
    endpoint: String,
}

impl DelegatedUrlFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Mint a GET URL. An expiry in the past is allowed; the server rejects it at use time.
    pub fn create_get_url(
        &self,
        resource_path: &str,
        expiry_epoch_seconds: i64,
        credential: &Credential,
    ) -> Result<DelegatedUrl> {
        self.mint("GET", resource_path, expiry_epoch_seconds, credential, None)
    }

    /// Mint a PUT URL bound to `content_type` and every entry of `custom_headers`.
    ///
    /// Header names outside the `x-amz-` namespace are treated as custom
    /// metadata and moved under `x-amz-meta-` so they take part in signing.
    pub fn create_put_url(
        &self,
        resource_path: &str,
        expiry_epoch_seconds: i64,
        credential: &Credential,
        content_type: &str,
        custom_headers: &BTreeMap<String, String>,
    ) -> Result<DelegatedUrl> {
        let mut headers: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in custom_headers {
            let bound_name = bound_header_name(name);
            let value = value.trim().to_string();
            match headers.get(&bound_name) {
                Some(existing) if *existing != value => {
                    return Err(S3Error::InvalidRequest(format!(
                        "headers bound as {} have conflicting values",
                        bound_name
                    )));
                }
                Some(_) => {}
                None => {
                    headers.insert(bound_name, value);
                }
            }
        }
        let bound = BoundMetadata {
            content_type: content_type.trim().to_string(),
            headers,
        };
        self.mint("PUT", resource_path, expiry_epoch_seconds, credential, Some(bound))
    }

    fn mint(
        &self,
        verb: &str,
        resource_path: &str,
        expiry_epoch_seconds: i64,
        credential: &Credential,
        bound_metadata: Option<BoundMetadata>,
    ) -> Result<DelegatedUrl> {
        let (content_type, headers) = match &bound_metadata {
            Some(bound) => (Some(bound.content_type.as_str()), Some(&bound.headers)),
            None => (None, None),
        };
        let canonical = build_canonical_request(
            verb,
            resource_path,
            headers.into_iter().flatten(),
            None,
            content_type,
            &SigningTime::Expires(expiry_epoch_seconds),
        )?;
        let signature = signer::sign(&canonical, credential);

        tracing::debug!(
            verb,
            resource = resource_path,
            expires = expiry_epoch_seconds,
            "minted delegated URL"
        );

        Ok(DelegatedUrl {
            verb: verb.to_string(),
            target_url: format!("{}{}", self.endpoint, resource_path),
            resource_path: resource_path.to_string(),
            access_id: credential.access_id().to_string(),
            expiry_epoch_seconds,
            signature,
            bound_metadata,
        })
    }
}

/// Check a presented request against a delegated URL the way the server does:
/// rebuild the canonical string from what was presented and compare signatures.
pub fn verify(
    url: &DelegatedUrl,
    credential: &Credential,
    presented: &PresentedRequest,
    now_epoch: i64,
) -> Result<()> {
    if url.access_id != credential.access_id() {
        return Err(S3Error::Authentication(format!(
            "unknown access id {}",
            url.access_id
        )));
    }
    if is_expired(url, now_epoch) {
        return Err(S3Error::Authentication(format!(
            "request has expired (expiry {}, now {})",
            url.expiry_epoch_seconds, now_epoch
        )));
    }

    let canonical = build_canonical_request(
        &presented.verb,
        &presented.resource_path,
        &presented.headers,
        None,
        presented.content_type.as_deref(),
        &SigningTime::Expires(url.expiry_epoch_seconds),
    )?;
    if signer::verify(&canonical, credential, &url.signature) {
        Ok(())
    } else {
        Err(S3Error::Authentication(
            "signature does not match presented request".to_string(),
        ))
    }
}

fn is_auth_param(pair: &str) -> bool {
    let name = pair.split_once('=').map_or(pair, |(name, _)| name);
    matches!(name, "AWSAccessKeyId" | "Expires" | "Signature")
}

fn bound_header_name(name: &str) -> String {
    let name = name.trim().to_ascii_lowercase();
    if name.starts_with(AMZ_HEADER_PREFIX) {
        name
    } else {
        format!("{}{}", AMZ_META_PREFIX, name)
    }
}
