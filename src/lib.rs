//! LP Factory - Control Console Library
//!
//! Client-side synchronization core for the LP Factory control console.
//! It keeps a local, persisted view of the operator's settings consistent
//! with an external "Engine" backend that may be real or simulated.
//!
//! # Overview
//!
//! - An observable application state store, persisted on every change
//! - A request gateway that serves fixtures in mock mode and talks HTTP in
//!   real mode, normalizing every outcome into a result
//! - Engine reachability tracking driven by request outcomes
//! - Interval polling and line-oriented job log streaming
//!
//! # Module Structure
//!
//! - **`shared`** - Platform-agnostic types
//!   - Error taxonomy, configuration, Engine domain records
//!
//! - **`console`** - The synchronization core
//!   - `AppStore` and `ApplicationState`
//!   - `SyncClient` with envelope decoding and mock routes
//!   - `Poller` and `LogStream`
//!
//! # Usage
//!
//! ```rust,no_run
//! use lpfactory::console::{AppStore, Config, SyncClient};
//!
//! # async fn example() -> Result<(), lpfactory::shared::ApiError> {
//! let store = AppStore::in_memory();
//! let client = SyncClient::new(store.clone(), &Config::new());
//!
//! let clusters = client.list_clusters(None).await?;
//! println!("{} clusters, reachable: {}", clusters.len(), store.is_reachable());
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - `AppStore` is a cloneable handle; mutations are serialized behind a
//!   mutex and listeners run after the lock is released
//! - `SyncClient` is cheap to clone and can be shared across tasks
//!
//! # Error Handling
//!
//! - `ApiResult<T>` for every Engine call; failures are values, not panics
//! - `StorageError` stays inside the store; a failed write is logged
//! - `ConfigError` for invalid configuration

/// Shared types and data structures
pub mod shared;

/// Control console core
pub mod console;
