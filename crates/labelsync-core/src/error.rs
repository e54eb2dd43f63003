//! Error types for labelsync-core
//!
//! Adapters never raise for expected conditions: a missing session is
//! `Ok(None)`, a failed write is a failed [`SyncResult`](crate::SyncResult).
//! This type covers everything else.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Remote store unreachable (connect or send failure)
    #[error("network error: {0}")]
    Network(String),

    /// Operation exceeded its time budget
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Remote store answered with a non-success status
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Underlying key-value store failed
    #[error("storage error: {0}")]
    Storage(String),

    /// On-device store is full
    #[error("storage quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded {
        /// Bytes the write needed
        needed: usize,
        /// Bytes still free
        available: usize,
    },

    /// Adapter-internal invariant violated (index/record mismatch, bad envelope)
    #[error("corrupted state: {0}")]
    Corruption(String),

    /// Encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid settings, rejected at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Selected behavior has no implementation
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),

    /// Anything unexpected
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout(_) | Error::Storage(_) => true,
            Error::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// Whether the failure happened below HTTP (the remote could not be reached).
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Network(format!("request timed out: {}", err));
        }
        if let Some(status) = err.status() {
            return Error::Http {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return Error::Internal(format!("invalid response body: {}", err));
        }
        Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Network("refused".into()).is_transient());
        assert!(Error::Timeout(Duration::from_secs(1)).is_transient());
        assert!(Error::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(!Error::Http {
            status: 400,
            message: "bad".into()
        }
        .is_transient());
        assert!(!Error::Configuration("x".into()).is_transient());
        assert!(!Error::Corruption("x".into()).is_transient());
    }

    #[test]
    fn test_network_classification() {
        assert!(Error::Network("down".into()).is_network());
        assert!(Error::Timeout(Duration::from_millis(5)).is_network());
        assert!(!Error::Storage("disk".into()).is_network());
    }

    #[test]
    fn test_display() {
        let err = Error::QuotaExceeded {
            needed: 10,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "storage quota exceeded: need 10 bytes, 3 available"
        );
    }
}
