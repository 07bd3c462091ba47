//! Shared Module
//!
//! Types shared by every layer of the control core: the error taxonomy,
//! configuration and the Engine domain records.

/// Error taxonomy
pub mod error;

/// Application configuration
pub mod config;

/// Engine domain records and user-editable collections
pub mod models;

pub use config::{AppConfig, AppConfigBuilder, ConfigError, RequestTimeouts};
pub use error::{ApiError, ApiErrorKind, ApiResult, StorageError};
pub use models::ConnectivityMode;
