//! In-process agent store for tests and local runs (`DATABASE_URL=memory`).

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::{AGENT_LOG_WINDOW, AgentStore};
use crate::models::{Agent, AgentStatus, ExecutionLogEntry, ScheduleUpdate};

#[derive(Debug, Default)]
pub struct MemoryAgentStore {
    agents: RwLock<HashMap<Uuid, Agent>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        Self {
            agents: RwLock::new(agents.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    pub async fn insert(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id, agent);
    }

    pub async fn get(&self, id: Uuid) -> Option<Agent> {
        self.agents.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn fetch_due_agents(&self, now: DateTime<Utc>) -> Result<Vec<Agent>> {
        let agents = self.agents.read().await;
        let mut due: Vec<Agent> = agents.values().filter(|a| a.is_due(now)).cloned().collect();
        due.sort_by_key(|a| a.next_execution);
        Ok(due)
    }

    async fn fetch_agent_by_id(&self, id: Uuid) -> Result<Option<Agent>> {
        Ok(self.get(id).await.map(|mut agent| {
            let excess = agent.execution_logs.len().saturating_sub(AGENT_LOG_WINDOW);
            agent.execution_logs.drain(..excess);
            agent
        }))
    }

    async fn append_execution_log(&self, id: Uuid, entry: &ExecutionLogEntry) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or_else(|| anyhow!("agent {} not found", id))?;
        agent.execution_logs.push(entry.clone());
        Ok(())
    }

    async fn update_schedule(&self, id: Uuid, update: ScheduleUpdate) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or_else(|| anyhow!("agent {} not found", id))?;
        agent.next_execution = agent.next_execution.max(update.next_execution);
        agent.execution_count = update.execution_count;
        agent.status = update.status;
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> Result<()> {
        let mut agents = self.agents.write().await;
        let agent = agents.get_mut(&id).ok_or_else(|| anyhow!("agent {} not found", id))?;
        agent.status = status;
        Ok(())
    }

    async fn recent_logs(&self, id: Uuid, limit: usize) -> Result<Vec<ExecutionLogEntry>> {
        let agents = self.agents.read().await;
        let agent = agents.get(&id).ok_or_else(|| anyhow!("agent {} not found", id))?;
        Ok(agent.execution_logs.iter().rev().take(limit).cloned().collect())
    }
}
