//! Postgres-backed [`AgentStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::database::connection::DatabaseConnection;
use crate::database::models::{AgentRow, ExecutionLogRow, FromRow};
use crate::database::store::{AGENT_LOG_WINDOW, AgentStore};
use crate::models::{Agent, AgentStatus, ExecutionLogEntry, ScheduleUpdate};

const AGENT_COLUMNS: &str = "id, name, user_address, agent_type, permission_context, delegation_manager, \
     session_key_address, config, status, next_execution, execution_count, max_executions";

const LOG_COLUMNS: &str = "executed_at, outcome, tx_hash, error, amount_in, amount_out, steps";

#[derive(Debug, Clone)]
pub struct PgAgentStore {
    db: DatabaseConnection,
}

impl PgAgentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn logs(&self, id: Uuid, limit: i64) -> Result<Vec<ExecutionLogEntry>> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        let query = format!(
            "SELECT {} FROM agent_execution_logs WHERE agent_id = $1 \
             ORDER BY executed_at DESC, id DESC LIMIT $2",
            LOG_COLUMNS
        );
        let rows = client
            .query(&query, &[&id, &limit])
            .await
            .context("Failed to query execution logs")?;

        rows.iter()
            .map(|row| {
                let log = ExecutionLogRow::from_row(row).context("Failed to decode execution log row")?;
                ExecutionLogEntry::try_from(log)
            })
            .collect()
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn fetch_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        let query = format!(
            "SELECT {} FROM agents WHERE status = 'active' AND next_execution <= $1 \
             ORDER BY next_execution ASC",
            AGENT_COLUMNS
        );
        let rows = client
            .query(&query, &[&now])
            .await
            .context("Failed to query due agents")?;

        let mut agents = Vec::with_capacity(rows.len());
        for row in &rows {
            let agent_row = AgentRow::from_row(row).context("Failed to decode agent row")?;
            let id = agent_row.id;
            match agent_row.into_agent(Vec::new()) {
                Ok(agent) => agents.push(agent),
                // One corrupt record must not hide every other due agent.
                Err(e) => tracing::error!("Skipping unreadable agent {}: {:#}", id, e),
            }
        }
        Ok(agents)
    }

    async fn fetch_agent_by_id(&self, id: Uuid) -> Result<Option<Agent>> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        let query = format!("SELECT {} FROM agents WHERE id = $1", AGENT_COLUMNS);
        let row = client
            .query_opt(&query, &[&id])
            .await
            .context("Failed to query agent by id")?;
        drop(client);

        let Some(row) = row else {
            return Ok(None);
        };
        let mut logs = self.recent_logs(id, AGENT_LOG_WINDOW).await?;
        logs.reverse();
        let agent = AgentRow::from_row(&row)
            .context("Failed to decode agent row")?
            .into_agent(logs)?;
        Ok(Some(agent))
    }

    async fn append_execution_log(&self, id: Uuid, entry: &ExecutionLogEntry) -> Result<()> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        client
            .execute(
                "INSERT INTO agent_execution_logs \
                 (agent_id, executed_at, outcome, tx_hash, error, amount_in, amount_out, steps) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                &[
                    &id,
                    &entry.timestamp,
                    &entry.outcome.as_str(),
                    &entry.tx_hash.map(|h| h.to_string()),
                    &entry.error,
                    &entry.amount_in.map(|a| a.to_string()),
                    &entry.amount_out.map(|a| a.to_string()),
                    &Json(&entry.steps),
                ],
            )
            .await
            .context("Failed to append execution log")?;
        Ok(())
    }

    async fn update_schedule(&self, id: Uuid, update: ScheduleUpdate) -> Result<()> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        let count = i32::try_from(update.execution_count).context("execution_count out of range")?;
        let updated = client
            .execute(
                "UPDATE agents SET next_execution = GREATEST(next_execution, $2), \
                 execution_count = $3, status = $4, updated_at = NOW() WHERE id = $1",
                &[&id, &update.next_execution, &count, &update.status.as_str()],
            )
            .await
            .context("Failed to update agent schedule")?;
        if updated == 0 {
            anyhow::bail!("agent {} not found", id);
        }
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        let client = self.db.pool().get().await.context("Failed to get DB connection")?;
        let updated = client
            .execute(
                "UPDATE agents SET status = $2, updated_at = NOW() WHERE id = $1",
                &[&id, &status.as_str()],
            )
            .await
            .context("Failed to update agent status")?;
        if updated == 0 {
            anyhow::bail!("agent {} not found", id);
        }
        Ok(())
    }

    async fn recent_logs(&self, id: Uuid, limit: usize) -> Result<Vec<ExecutionLogEntry>> {
        let limit = i64::try_from(limit).context("log limit out of range")?;
        self.logs(id, limit).await
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }
}
