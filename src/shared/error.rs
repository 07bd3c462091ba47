//! Shared Error Types
//!
//! This module defines the error taxonomy used across the control core.
//!
//! # Error Categories
//!
//! - `ApiError` - the error half of every Engine request result
//! - `StorageError` - persistence adapter failures (never escape the store)
//!
//! `ApiError` carries an [`ApiErrorKind`] that decides how the failure is
//! treated globally. Only [`ApiErrorKind::Network`] affects reachability;
//! an HTTP error of any status proves the transport and server are alive.
//!
//! # Usage
//!
//! ```rust
//! use lpfactory::shared::error::{ApiError, ApiErrorKind};
//!
//! let error = ApiError::http(502, "Bad Gateway");
//! assert_eq!(error.kind, ApiErrorKind::Http { status: 502 });
//! assert!(!error.is_connectivity());
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by every Engine request.
pub type ApiResult<T> = Result<T, ApiError>;

/// Classification of a failed Engine request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// The request exceeded its deadline
    Timeout,
    /// The Engine answered with a non-2xx status
    Http {
        /// HTTP status code
        status: u16,
    },
    /// The host could not be reached at all (DNS, TLS, refused, CORS)
    Network,
    /// A 2xx body carried an Engine-level failure (`success: false` or `{detail}`)
    Engine,
    /// Mock mode has no fixture for the requested path
    MockRouteNotFound,
    /// The payload could not be decoded into the requested type
    Decode,
    /// The caller cancelled the request before it completed
    Cancelled,
    /// A live byte stream could not be opened or died mid-way
    StreamUnavailable,
}

/// Error half of [`ApiResult`].
///
/// Serializes to the Engine's `{ "message": ..., "code": ... }` shape so it can
/// be handed to presentation code unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// Failure classification (not part of the wire shape)
    #[serde(skip, default = "default_kind")]
    pub kind: ApiErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional machine-readable code supplied by the Engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

fn default_kind() -> ApiErrorKind {
    ApiErrorKind::Engine
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// Attach an Engine error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn timeout() -> Self {
        Self::new(ApiErrorKind::Timeout, "Timeout")
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Http { status }, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Engine, message)
    }

    pub fn mock_route_not_found(path: &str) -> Self {
        Self::new(
            ApiErrorKind::MockRouteNotFound,
            format!("Route not found in mock: {}", path),
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ApiErrorKind::Cancelled, "Request cancelled")
    }

    pub fn stream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::StreamUnavailable, message)
    }

    /// Whether this failure means the Engine itself is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network)
    }

    /// HTTP status, when the Engine answered at all
    pub fn status(&self) -> Option<u16> {
        match self.kind {
            ApiErrorKind::Http { status } => Some(status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(format!("JSON error: {}", err))
    }
}

/// Persistence adapter failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
