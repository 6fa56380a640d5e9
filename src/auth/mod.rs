//! # Authentication Module
//!
//! Shared-key protection for the trigger endpoints.

pub mod middleware;

pub use middleware::{AuthMiddleware, TriggerKey};
