//! Execution engine for delegated on-chain agents.
//!
//! The [`agent::Scheduler`] fetches due agents from an [`database::AgentStore`],
//! dispatches each through the [`agent::AgentRouter`] to its strategy, and
//! records the outcome with the [`agent::ResultReporter`].

pub mod agent;
pub mod auth;
pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;

#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod test_support;
