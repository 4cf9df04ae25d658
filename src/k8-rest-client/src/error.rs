use std::io::Error as IoError;

use http::header::InvalidHeaderValue;
use http::StatusCode;
use thiserror::Error;

use k8_rest_types::SchemeError;
use k8_rest_types::Status;

use crate::exec::ExecStatus;

// For error mapping, see https://doc.rust-lang.org/nightly/core/convert/trait.From.html

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: IoError,
    },
    #[error("HTTP error: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
    #[error("invalid HTTP header value: {source}")]
    InvalidHeaderValue {
        #[from]
        source: InvalidHeaderValue,
    },
    #[error("invalid HTTP header name: {source}")]
    InvalidHeaderName {
        #[from]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid URI: {source}")]
    InvalidUri {
        #[from]
        source: http::uri::InvalidUri,
    },
    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: hyper::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("scheme error: {source}")]
    Scheme {
        #[from]
        source: SchemeError,
    },
    #[error("server error: {source}")]
    Status {
        #[from]
        source: StatusError,
    },
    #[error("response body already consumed")]
    BodyConsumed,
    #[error("protocol upgrade failed: {message}")]
    Upgrade {
        message: String,
        status: Option<Status>,
    },
    #[error("command failed with code {}", .0.code)]
    ExecFailed(ExecStatus),
    #[error("operation cancelled")]
    Cancelled,
    #[error("operation timed out")]
    TimedOut,
}

impl ClientError {
    /// true when the error is a 404 from the server
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Status { source } => source.is_not_found(),
            _ => false,
        }
    }
}

/// non-success HTTP response, with the decoded or synthesized `Status`
#[derive(Error, Debug)]
#[error("HTTP {code}: {}", .status.message.as_deref().unwrap_or("no detail"))]
pub struct StatusError {
    pub code: StatusCode,
    pub status: Status,
}

impl StatusError {
    pub fn new(code: StatusCode, status: Status) -> Self {
        Self { code, status }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StatusCode::NOT_FOUND
    }
}
