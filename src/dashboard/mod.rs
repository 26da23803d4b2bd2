//! Dashboard Module
//!
//! Read-only HTTP API over the latest fleet snapshot.
//! Only compiled when the `dashboard` feature is enabled.

mod api;

pub use api::{create_router, serve, ApiResponse};
