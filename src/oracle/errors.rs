//! Error taxonomy for outbound calls, configuration and curve tracking.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a failed outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Connection reset, DNS failure, dropped socket
    NetworkTransient,
    /// The per-call timeout expired
    Timeout,
    /// 429-class response
    RateLimited,
    /// Any other 4xx response
    ClientError,
    /// 5xx response
    ServerError,
    /// Payload did not have the expected shape
    MalformedResponse,
}

impl ErrorKind {
    /// Whether the gateway should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkTransient
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTransient => "network_transient",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ClientError => "client_error",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
        }
    }
}

/// Failure of a single outbound call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("transient network error: {0}")]
    NetworkTransient(String),
    /// Carries the attempt deadline when it is known.
    #[error("call timed out{}", .0.as_ref().map(|d| format!(" after {:?}", d)).unwrap_or_default())]
    Timeout(Option<Duration>),
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("client error {status}: {message}")]
    ClientError { status: u16, message: String },
    #[error("server error {status}")]
    ServerError { status: u16 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl CallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CallError::NetworkTransient(_) => ErrorKind::NetworkTransient,
            CallError::Timeout(_) => ErrorKind::Timeout,
            CallError::RateLimited { .. } => ErrorKind::RateLimited,
            CallError::ClientError { .. } => ErrorKind::ClientError,
            CallError::ServerError { .. } => ErrorKind::ServerError,
            CallError::MalformedResponse(_) => ErrorKind::MalformedResponse,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS {
            CallError::RateLimited { retry_after }
        } else if status.is_server_error() {
            CallError::ServerError { status: status.as_u16() }
        } else {
            CallError::ClientError {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CallError::Timeout(None)
        } else if err.is_decode() {
            CallError::MalformedResponse(err.to_string())
        } else if let Some(status) = err.status() {
            CallError::from_status(status, None)
        } else {
            CallError::NetworkTransient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::MalformedResponse(err.to_string())
    }
}

/// Invalid configuration; raised once at startup.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("tier thresholds must satisfy critical > high > medium > 0")]
    ThresholdOrder,
    #[error("curve boundaries must satisfy 0 < warning < urgent <= 1")]
    BoundaryOrder,
    #[error("max_backoff_delay must be >= base_backoff_delay")]
    BackoffOrder,
    #[error("at least one timeframe is required")]
    NoTimeframes,
    #[error("duplicate timeframe {0}")]
    DuplicateTimeframe(String),
}

/// Rejected bonding-curve observation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CurveError {
    #[error("sample for {address} at {timestamp} is older than the last sample at {last}")]
    OutOfOrder {
        address: String,
        timestamp: i64,
        last: i64,
    },
    #[error("market cap must be a finite non-negative number, got {0}")]
    InvalidMarketCap(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            CallError::from_status(StatusCode::TOO_MANY_REQUESTS, None).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            CallError::from_status(StatusCode::NOT_FOUND, None).kind(),
            ErrorKind::ClientError
        );
        assert_eq!(
            CallError::from_status(StatusCode::BAD_GATEWAY, None).kind(),
            ErrorKind::ServerError
        );
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::NetworkTransient.is_retryable());
        assert!(!ErrorKind::ClientError.is_retryable());
        assert!(!ErrorKind::MalformedResponse.is_retryable());
    }

    #[test]
    fn test_json_error_is_malformed() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert_eq!(CallError::from(err).kind(), ErrorKind::MalformedResponse);
    }
}
