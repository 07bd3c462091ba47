//! Integration tests: the gateway against a simulated Engine, store
//! persistence, and polling/streaming end to end

#[macro_use]
#[path = "../common/mod.rs"]
mod common;

mod refresh_test;
mod store_persistence_test;
mod sync_client_test;
