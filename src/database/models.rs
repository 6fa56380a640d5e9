// Database Models
//
// Raw row shapes for the agent tables and their conversion into domain models.
// Addresses, hashes and token amounts are stored as text so they stay exact.

use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Row;
use tokio_postgres::types::Json;
use uuid::Uuid;

use crate::models::{Agent, ExecutionLogEntry, LogOutcome, StepRecord};

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>
    where
        Self: Sized;
}

#[derive(Debug, Clone)]
pub struct AgentRow {
    pub id: Uuid,
    pub name: String,
    pub user_address: String,
    pub agent_type: String,
    pub permission_context: Vec<u8>,
    pub delegation_manager: String,
    pub session_key_address: String,
    pub config: Value,
    pub status: String,
    pub next_execution: DateTime<Utc>,
    pub execution_count: i32,
    pub max_executions: Option<i32>,
}

impl FromRow for AgentRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            user_address: row.try_get("user_address")?,
            agent_type: row.try_get("agent_type")?,
            permission_context: row.try_get("permission_context")?,
            delegation_manager: row.try_get("delegation_manager")?,
            session_key_address: row.try_get("session_key_address")?,
            config: row.try_get("config")?,
            status: row.try_get("status")?,
            next_execution: row.try_get("next_execution")?,
            execution_count: row.try_get("execution_count")?,
            max_executions: row.try_get("max_executions")?,
        })
    }
}

impl AgentRow {
    pub fn into_agent(self, execution_logs: Vec<ExecutionLogEntry>) -> Result<Agent> {
        Ok(Agent {
            id: self.id,
            name: self.name,
            user_address: parse_address(&self.user_address, "user_address")?,
            agent_type: self.agent_type,
            permission_context: Bytes::from(self.permission_context),
            delegation_manager: parse_address(&self.delegation_manager, "delegation_manager")?,
            session_key_address: parse_address(&self.session_key_address, "session_key_address")?,
            config: self.config,
            status: self.status.parse()?,
            next_execution: self.next_execution,
            execution_count: u32::try_from(self.execution_count).context("negative execution_count")?,
            max_executions: self
                .max_executions
                .map(u32::try_from)
                .transpose()
                .context("negative max_executions")?,
            execution_logs,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionLogRow {
    pub executed_at: DateTime<Utc>,
    pub outcome: String,
    pub tx_hash: Option<String>,
    pub error: Option<String>,
    pub amount_in: Option<String>,
    pub amount_out: Option<String>,
    pub steps: Json<Vec<StepRecord>>,
}

impl FromRow for ExecutionLogRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            executed_at: row.try_get("executed_at")?,
            outcome: row.try_get("outcome")?,
            tx_hash: row.try_get("tx_hash")?,
            error: row.try_get("error")?,
            amount_in: row.try_get("amount_in")?,
            amount_out: row.try_get("amount_out")?,
            steps: row.try_get("steps")?,
        })
    }
}

impl TryFrom<ExecutionLogRow> for ExecutionLogEntry {
    type Error = anyhow::Error;

    fn try_from(row: ExecutionLogRow) -> Result<Self> {
        Ok(Self {
            timestamp: row.executed_at,
            outcome: LogOutcome::from_str(&row.outcome)?,
            tx_hash: row
                .tx_hash
                .as_deref()
                .map(B256::from_str)
                .transpose()
                .context("invalid tx_hash in execution log")?,
            error: row.error,
            amount_in: parse_amount(row.amount_in.as_deref())?,
            amount_out: parse_amount(row.amount_out.as_deref())?,
            steps: row.steps.0,
        })
    }
}

fn parse_address(raw: &str, column: &str) -> Result<Address> {
    Address::from_str(raw).with_context(|| format!("invalid {} column: {}", column, raw))
}

fn parse_amount(raw: Option<&str>) -> Result<Option<U256>> {
    raw.map(|s| U256::from_str(s).with_context(|| format!("invalid amount: {}", s)))
        .transpose()
}
