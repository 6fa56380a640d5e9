//! # Database Module
//!
//! Agent persistence behind the [`AgentStore`] contract: a Postgres store on
//! tokio-postgres with deadpool pooling and refinery migrations, and an
//! in-memory store with the same semantics.

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pg_store;
pub mod store;

pub use connection::{DatabaseConnection, PoolConfig};
pub use memory::MemoryAgentStore;
pub use pg_store::PgAgentStore;
pub use store::{AGENT_LOG_WINDOW, AgentStore};
