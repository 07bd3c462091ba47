//! Control Console Core
//!
//! Everything between the operator's views and the Engine: the observable
//! application state, the request gateway that answers from fixtures or the
//! network, and the refresh loops built on top of it.
//!
//! # Architecture
//!
//! - **`config`** - Runtime configuration (env, optional TOML file)
//! - **`state`** - `ApplicationState`, `AppStore`, persistence adapters
//! - **`sync`** - `SyncClient`, envelope decoding, mock fixtures, typed endpoints
//! - **`refresh`** - Interval poller and job log streaming
//! - **`main`** - `lpf-console` binary
//!
//! # Module Structure
//!
//! ```text
//! console/
//! ├── mod.rs          - Module exports and documentation
//! ├── main.rs         - Binary entry point
//! ├── config.rs       - Configuration wrapper
//! ├── state/          - Store, state record, persistence
//! ├── sync/           - Gateway, envelopes, mock routes, endpoints
//! └── refresh/        - Poller, log stream
//! ```

pub mod config;
pub mod refresh;
pub mod state;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use refresh::{LogStream, PollHandle, Poller, StreamStatus};
pub use state::{AppStore, ApplicationState, StatePatch, Subscription};
pub use sync::{RequestOptions, SyncClient};
