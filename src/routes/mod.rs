// # Routes Module
//
// Thin HTTP trigger surface over the execution engine.
//
// ## Available Route Modules
// - `health`: liveness and readiness endpoints
// - `agent`: manual single-agent execution
// - `scheduler`: run-due-agents trigger and scheduler status

/// Health check and monitoring endpoints
pub mod health;

/// Manual agent execution endpoints
pub mod agent;

/// Scheduler trigger and status endpoints
pub mod scheduler;
