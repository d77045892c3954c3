//! Core types - pure abstractions shared across the codebase.

mod error;
mod id;
mod policy;
mod state;

pub use error::BindError;
pub use id::InputId;
pub use policy::RatePolicy;
pub use state::{is_shutdown, register_shutdown, setup_shutdown_handler};

/// A control value: driver-defined, JSON-compatible.
pub type Value = serde_json::Value;
