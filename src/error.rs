//! Error types for the etcd v2 client

use std::io;
use thiserror::Error;

use crate::types::EtcdError;

/// Errors that can occur when talking to an etcd v2 cluster
#[derive(Error, Debug)]
pub enum Error {
    /// The server answered with a well-formed etcd error body
    #[error("etcd error: {0}")]
    Etcd(EtcdError),

    /// The server answered with a non-success status and a body that is not an etcd error
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A success response whose body does not match the expected shape
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request timeout
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Redirect chain exceeded the configured maximum
    #[error("Too many redirects (max {0})")]
    TooManyRedirects(usize),

    /// The request could not be assembled
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// TLS/SSL error
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The etcd `errorCode`, if this is an application error
    pub fn etcd_code(&self) -> Option<u64> {
        match self {
            Error::Etcd(e) => Some(e.error_code),
            _ => None,
        }
    }

    /// The decoded etcd error, if this is an application error
    pub fn as_etcd(&self) -> Option<&EtcdError> {
        match self {
            Error::Etcd(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EtcdError> for Error {
    fn from(err: EtcdError) -> Self {
        Error::Etcd(err)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
