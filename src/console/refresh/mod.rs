//! # Refresh Loops
//!
//! Keeping views fresh against the Engine:
//!
//! - [`Poller`] re-runs a fetch on an interval without ever overlapping
//!   calls, and stops on cancel or when a result satisfies a predicate.
//! - [`LogStream`] follows a live byte stream line by line into a bounded
//!   [`LogBuffer`], with manual reconnect.

pub mod log_stream;
pub mod poller;

pub use log_stream::{
    LineDecoder, LogBuffer, LogStream, StreamStatus, DEFAULT_LOG_CAPACITY, MAX_LINE_BYTES,
};
pub use poller::{PollHandle, Poller};
