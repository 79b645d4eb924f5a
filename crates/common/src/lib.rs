//! Shared types for the storefront order subsystem.

pub mod types;

pub use types::{OrderId, Version};
