//! courier library crate.
//!
//! Event-triggered notification delivery: routing rules fan an event out to
//! organization channels, a persistent queue retries failed sends with
//! exponential backoff, and email, telegram and webhook transports deliver
//! rendered templates with tracked call-to-action links.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod notification;

pub use error::{Error, Result};
