//! Error types for the client and dispatch engines.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the request dispatch and update ingestion engines.
///
/// The three families behave differently at the retry boundary:
/// - [`Error::Validation`] is never retried and surfaces immediately.
/// - [`Error::Network`] is retried up to the configured budget.
/// - [`Error::Api`] / [`Error::Decode`] follow the same retry budget,
///   except a rate-limit response (code 429) which earns one extra
///   wait-and-resubmit cycle outside that budget.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed token, method name, parameter or configuration.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Transport-level failure: connection refused, timeout, TLS.
    #[error("network failure calling '{method}': {source}")]
    Network {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service responded but reported failure.
    #[error("api error {code} calling '{method}': {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
        /// Server-specified wait before the call may be resubmitted.
        /// Only present on rate-limit responses.
        retry_after: Option<Duration>,
    },

    /// The service responded 2xx but the body was not a valid API envelope.
    #[error("malformed api response for '{method}': {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    /// A file parameter could not be read for multipart encoding.
    #[error("failed to read upload '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Whether the retry loop may attempt this call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation(_) | Error::FileRead { .. } => false,
            Error::Network { .. } | Error::Decode { .. } => true,
            // Rate limiting is handled by its own resubmit cycle; every
            // other API failure goes through the ordinary budget.
            Error::Api { code, .. } => *code != 429,
        }
    }

    /// Server-specified rate-limit wait, if this is a 429 response.
    pub fn rate_limit_wait(&self) -> Option<Duration> {
        match self {
            Error::Api {
                code, retry_after, ..
            } if *code == 429 => Some(retry_after.unwrap_or(Duration::from_secs(1))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!Error::Validation("bad token".into()).is_retryable());
    }

    #[test]
    fn test_rate_limit_wait_only_for_429() {
        let limited = Error::Api {
            method: "sendMessage".into(),
            code: 429,
            description: "Too Many Requests".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(limited.rate_limit_wait(), Some(Duration::from_secs(7)));
        assert!(!limited.is_retryable());

        let other = Error::Api {
            method: "sendMessage".into(),
            code: 400,
            description: "Bad Request".into(),
            retry_after: None,
        };
        assert_eq!(other.rate_limit_wait(), None);
        assert!(other.is_retryable());
    }
}
