//! REST API server module.
//!
//! Provides the event trigger, notification administration, click tracking
//! and logging endpoints.

pub mod error;
pub mod openapi;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
