//! The narrow query/update contract the engine consumes from the agent store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Agent, AgentStatus, ExecutionLogEntry, ScheduleUpdate};

/// Most recent log entries carried on an agent loaded by id.
pub const AGENT_LOG_WINDOW: usize = 20;

#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Active agents with `next_execution <= now`, earliest first.
    ///
    /// Implementations may leave `execution_logs` empty here.
    async fn fetch_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>>;

    /// The agent with its last [`AGENT_LOG_WINDOW`] log entries, oldest first.
    async fn fetch_agent_by_id(&self, id: Uuid) -> Result<Option<Agent>>;

    async fn append_execution_log(&self, id: Uuid, entry: &ExecutionLogEntry) -> Result<()>;

    /// `next_execution` never moves backwards, whatever the update says.
    async fn update_schedule(&self, id: Uuid, update: ScheduleUpdate) -> Result<()>;

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> Result<()>;

    /// Up to `limit` log entries, newest first.
    async fn recent_logs(&self, id: Uuid, limit: usize) -> Result<Vec<ExecutionLogEntry>>;

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
