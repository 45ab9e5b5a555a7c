//! Database models for courier.
//!
//! These models map directly to the database schema. List and map fields
//! are stored as JSON text and decoded through `sqlx::types::Json`.

pub mod channel;
pub mod history;
pub mod organization;
pub mod queue;
pub mod routing_rule;
pub mod sender;
pub mod template;

pub use channel::*;
pub use history::*;
pub use organization::*;
pub use queue::*;
pub use routing_rule::*;
pub use sender::*;
pub use template::*;
