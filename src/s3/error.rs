//! Error taxonomy for signing and remote calls

use hyper::StatusCode;
use thiserror::Error;

/// S3 signing and transport errors
#[derive(Error, Debug)]
pub enum S3Error {
    /// Malformed input to signing (local, never retried)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network failure or 5xx/429 response; retried with backoff by the batch executor
    #[error("Transient transport error: {0}")]
    TransientTransport(String),

    /// Signature rejected by the remote, or a delegated URL that fails verification
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("S3 error: {status} - {message}")]
    S3Response { status: StatusCode, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

impl S3Error {
    /// Map a non-success HTTP status to the matching error kind
    pub fn from_status(status: StatusCode, message: String) -> Self {
        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            S3Error::Authentication(format!("{} - {}", status, message))
        } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            S3Error::TransientTransport(format!("{} - {}", status, message))
        } else {
            S3Error::S3Response { status, message }
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, S3Error::TransientTransport(_))
    }
}

pub type Result<T> = std::result::Result<T, S3Error>;
