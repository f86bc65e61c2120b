//! Error types and retry classification for the quote engine.
//!
//! This module provides:
//! - [`QuoteFetchError`]: The main error enum for all acquisition operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur while acquiring quotes.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// scheduler and pipeline should handle the error.
#[derive(Error, Debug)]
pub enum QuoteFetchError {
    /// The upstream throttled the request (HTTP 429/999 or a throttling body).
    #[error("Rate limited via {identity}: {signature}")]
    RateLimited {
        /// The network identity that was throttled ("direct" without a proxy)
        identity: String,
        /// The status or body pattern that was recognized
        signature: String,
    },

    /// The upstream rejected the session's authentication artifacts.
    #[error("Authentication rejected via {identity}: {signature}")]
    AuthRejected {
        /// The network identity whose session was rejected
        identity: String,
        /// The status or body pattern that was recognized
        signature: String,
    },

    /// The request timed out.
    #[error("Timeout via {identity}")]
    Timeout {
        /// The network identity that timed out
        identity: String,
    },

    /// The upstream answered with a server-side error.
    #[error("Upstream error: HTTP {status}")]
    Upstream {
        /// HTTP status code
        status: u16,
    },

    /// The payload could not be decoded at all.
    #[error("Malformed response: {message}")]
    Malformed {
        /// Description of what failed to decode
        message: String,
    },

    /// The upstream explicitly reported that the instrument does not exist.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The upstream answered but had no data for the instrument.
    #[error("No data for symbol: {0}")]
    NoData(String),

    /// A proxy candidate could not be turned into a usable address.
    #[error("Invalid proxy address '{address}': {message}")]
    InvalidProxy {
        /// The address as supplied
        address: String,
        /// Why it was rejected
        message: String,
    },

    /// The run deadline expired before the work was issued.
    #[error("Run deadline expired")]
    Cancelled,

    /// A collaborator failed to read or write its backing file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collaborator failed to encode or decode JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A transport error occurred while talking to the upstream.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl QuoteFetchError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::RotateIdentity`]: penalize the identity, retry the chunk elsewhere
    /// - [`RetryClass::Transient`]: retry in-tier, then fall through
    /// - [`RetryClass::Terminal`]: the symbol is done for this run
    /// - [`RetryClass::Never`]: stop
    ///
    /// # Examples
    ///
    /// ```
    /// use quotescan_engine::errors::{QuoteFetchError, RetryClass};
    ///
    /// let error = QuoteFetchError::RateLimited {
    ///     identity: "http://10.0.0.1:8080".to_string(),
    ///     signature: "HTTP 429".to_string(),
    /// };
    /// assert_eq!(error.retry_class(), RetryClass::RotateIdentity);
    ///
    /// let error = QuoteFetchError::SymbolNotFound("ZZZZ".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Terminal);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Identity is throttled or its session is rejected
            Self::RateLimited { .. } | Self::AuthRejected { .. } | Self::InvalidProxy { .. } => {
                RetryClass::RotateIdentity
            }

            Self::Timeout { .. } | Self::Upstream { .. } | Self::Malformed { .. } => {
                RetryClass::Transient
            }

            // reqwest timeouts surface here too when the builder timeout fires
            Self::Network(_) => RetryClass::Transient,

            Self::SymbolNotFound(_) | Self::NoData(_) => RetryClass::Terminal,

            Self::Cancelled | Self::Io(_) | Self::Serialization(_) => RetryClass::Never,
        }
    }

    /// True when the error is a rate-limit or authentication-block signature.
    pub fn is_block_signature(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::AuthRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_rotates_identity() {
        let error = QuoteFetchError::RateLimited {
            identity: "direct".to_string(),
            signature: "HTTP 429".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::RotateIdentity);
        assert!(error.is_block_signature());
    }

    #[test]
    fn test_auth_rejected_rotates_identity() {
        let error = QuoteFetchError::AuthRejected {
            identity: "http://1.2.3.4:80".to_string(),
            signature: "Invalid Crumb".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::RotateIdentity);
        assert!(error.is_block_signature());
    }

    #[test]
    fn test_invalid_proxy_rotates_without_block_signature() {
        let error = QuoteFetchError::InvalidProxy {
            address: "http://".to_string(),
            message: "empty host".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::RotateIdentity);
        assert!(!error.is_block_signature());
    }

    #[test]
    fn test_timeout_is_transient() {
        let error = QuoteFetchError::Timeout {
            identity: "direct".to_string(),
        };
        assert_eq!(error.retry_class(), RetryClass::Transient);
    }

    #[test]
    fn test_upstream_and_malformed_are_transient() {
        assert_eq!(
            QuoteFetchError::Upstream { status: 502 }.retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            QuoteFetchError::Malformed {
                message: "expected value".to_string()
            }
            .retry_class(),
            RetryClass::Transient
        );
    }

    #[test]
    fn test_not_found_and_no_data_are_terminal() {
        assert_eq!(
            QuoteFetchError::SymbolNotFound("XYZQ".to_string()).retry_class(),
            RetryClass::Terminal
        );
        assert_eq!(
            QuoteFetchError::NoData("XYZQ".to_string()).retry_class(),
            RetryClass::Terminal
        );
    }

    #[test]
    fn test_cancelled_never_retries() {
        assert_eq!(QuoteFetchError::Cancelled.retry_class(), RetryClass::Never);
    }

    #[test]
    fn test_error_display() {
        let error = QuoteFetchError::SymbolNotFound("INVALID".to_string());
        assert_eq!(format!("{}", error), "Symbol not found: INVALID");

        let error = QuoteFetchError::RateLimited {
            identity: "direct".to_string(),
            signature: "HTTP 429".to_string(),
        };
        assert_eq!(format!("{}", error), "Rate limited via direct: HTTP 429");

        let error = QuoteFetchError::Upstream { status: 503 };
        assert_eq!(format!("{}", error), "Upstream error: HTTP 503");
    }
}
