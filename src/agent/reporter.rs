//! # Result Reporter
//!
//! Turns a strategy outcome into store updates. This is the only place the
//! engine mutates an agent's scheduling state:
//!
//! | outcome  | log entry | schedule                                  | status                          |
//! |----------|-----------|-------------------------------------------|---------------------------------|
//! | executed | success   | `next += interval`, `count += 1`          | `completed` at the cap/one-shot |
//! | failed   | failure   | unchanged, so the same slot is retried    | `failed` on config error or 5 in a row |
//! | skipped  | none      | unchanged                                 | unchanged                       |
//! | expired  | cancelled | unchanged                                 | `cancelled`                     |
//!
//! An executed outcome writes the schedule before its log entry. When the
//! schedule write keeps failing, the agent is paused so a slot whose
//! transactions already landed is never picked up again automatically.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::AgentStore;
use crate::models::{
    Agent, AgentStatus, AgentType, DcaConfig, ExecutionLogEntry, ExecutionResult, LogOutcome,
    RecurringPaymentConfig, SavingsConfig, ScheduleUpdate, StrategyOutcome,
};

pub const MAX_CONSECUTIVE_FAILURES: usize = 5;

const SCHEDULE_WRITE_ATTEMPTS: u32 = 3;
const SCHEDULE_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(100);

#[derive(Clone)]
pub struct ResultReporter {
    store: Arc<dyn AgentStore>,
}

impl ResultReporter {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    /// Persist `outcome` for `agent` and return the agent's resulting status.
    pub async fn report(&self, agent: &Agent, outcome: &StrategyOutcome, now: DateTime<Utc>) -> Result<AgentStatus> {
        match outcome {
            StrategyOutcome::Executed(result) => self.record_success(agent, result, now).await,
            StrategyOutcome::Failed(result) => self.record_failure(agent, result, now).await,
            StrategyOutcome::Skipped(_) => Ok(agent.status),
            StrategyOutcome::Expired(_) => {
                self.store
                    .append_execution_log(agent.id, &ExecutionLogEntry::cancelled("Order expired", now))
                    .await?;
                self.store.update_status(agent.id, AgentStatus::Cancelled).await?;
                info!("Agent {} cancelled: order expired", agent.id);
                Ok(AgentStatus::Cancelled)
            }
        }
    }

    async fn record_success(&self, agent: &Agent, result: &ExecutionResult, now: DateTime<Utc>) -> Result<AgentStatus> {
        let kind = agent.kind()?;
        // Fixed cadence: the next slot is measured from the scheduled one, not
        // from when this execution finished.
        let next_execution = match interval(agent, kind)? {
            Some(interval) => agent.next_execution + interval,
            None => agent.next_execution,
        };
        let execution_count = agent.execution_count.saturating_add(1);
        let capped = agent.max_executions.is_some_and(|max| execution_count >= max);
        let status = if kind.is_one_shot() || capped {
            AgentStatus::Completed
        } else {
            agent.status
        };

        let update = ScheduleUpdate {
            next_execution,
            execution_count,
            status,
        };
        // The transactions are confirmed: the schedule has to move before
        // anything else, or the next pass repeats them.
        if let Err(e) = self.advance_schedule(agent.id, update).await {
            error!("Agent {} executed but its schedule was not advanced: {:#}", agent.id, e);
            if let Err(pause_err) = self.store.update_status(agent.id, AgentStatus::Paused).await {
                error!("Failed to pause agent {} after a lost schedule write: {:#}", agent.id, pause_err);
            }
            return Err(e.context("schedule not advanced after a confirmed execution, agent paused"));
        }

        if let Err(e) = self
            .store
            .append_execution_log(agent.id, &ExecutionLogEntry::from_result(result, now))
            .await
        {
            warn!("Agent {} executed but its log entry was not written: {:#}", agent.id, e);
        }

        info!(
            "Agent {} executed ({}): count {}, next {}, status {}",
            agent.id,
            result.tx_hash.map(|h| h.to_string()).unwrap_or_default(),
            execution_count,
            next_execution,
            status
        );
        Ok(status)
    }

    async fn advance_schedule(&self, id: Uuid, update: ScheduleUpdate) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.store.update_schedule(id, update).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= SCHEDULE_WRITE_ATTEMPTS => return Err(e),
                Err(e) => {
                    warn!("Schedule write for agent {} failed (attempt {}): {:#}", id, attempt, e);
                    tokio::time::sleep(SCHEDULE_RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn record_failure(&self, agent: &Agent, result: &ExecutionResult, now: DateTime<Utc>) -> Result<AgentStatus> {
        self.store
            .append_execution_log(agent.id, &ExecutionLogEntry::from_result(result, now))
            .await?;

        if result.failure.is_some_and(|kind| kind.is_fatal()) {
            self.store.update_status(agent.id, AgentStatus::Failed).await?;
            warn!(
                "Agent {} stopped on configuration error: {}",
                agent.id,
                result.error.as_deref().unwrap_or("unknown")
            );
            return Ok(AgentStatus::Failed);
        }

        let recent = self.store.recent_logs(agent.id, MAX_CONSECUTIVE_FAILURES).await?;
        let exhausted = recent.len() == MAX_CONSECUTIVE_FAILURES
            && recent.iter().all(|entry| entry.outcome == LogOutcome::Failure);
        if exhausted {
            self.store.update_status(agent.id, AgentStatus::Failed).await?;
            warn!(
                "Agent {} failed {} times in a row, no further retries",
                agent.id, MAX_CONSECUTIVE_FAILURES
            );
            return Ok(AgentStatus::Failed);
        }

        Ok(agent.status)
    }
}

/// Cadence of a recurring agent; `None` for one-shot types.
fn interval(agent: &Agent, kind: AgentType) -> Result<Option<Duration>> {
    let seconds = match kind {
        AgentType::Dca => agent.typed_config::<DcaConfig>()?.interval_seconds,
        AgentType::Savings => agent.typed_config::<SavingsConfig>()?.interval_seconds,
        AgentType::RecurringPayment => agent.typed_config::<RecurringPaymentConfig>()?.interval_seconds,
        AgentType::LimitOrder => return Ok(None),
    };
    let seconds = i64::try_from(seconds)?;
    Ok(Some(Duration::try_seconds(seconds).ok_or_else(|| {
        anyhow::anyhow!("interval of {} seconds is out of range", seconds)
    })?))
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256};

    use super::*;
    use crate::database::MemoryAgentStore;
    use crate::error::ExecutorError;
    use crate::models::{PriceCheckReason, PriceCheckResult};
    use crate::test_support;

    fn executed() -> StrategyOutcome {
        StrategyOutcome::Executed(ExecutionResult::succeeded(
            B256::repeat_byte(9),
            U256::from(100u64),
            U256::from(99u64),
            Vec::new(),
        ))
    }

    fn failed(err: ExecutorError) -> StrategyOutcome {
        StrategyOutcome::failure(&err, Vec::new())
    }

    async fn setup(agent: &Agent) -> (Arc<MemoryAgentStore>, ResultReporter) {
        let store = Arc::new(MemoryAgentStore::with_agents([agent.clone()]));
        let reporter = ResultReporter::new(store.clone());
        (store, reporter)
    }

    #[tokio::test]
    async fn success_advances_from_scheduled_slot() {
        let agent = test_support::dca_agent();
        let (store, reporter) = setup(&agent).await;

        // Finishing long after the slot does not shift the cadence.
        let finished = agent.next_execution + Duration::hours(3);
        let status = reporter.report(&agent, &executed(), finished).await.unwrap();

        let stored = store.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Active);
        assert_eq!(stored.next_execution, agent.next_execution + Duration::seconds(86400));
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.execution_logs[0].outcome, LogOutcome::Success);
    }

    #[tokio::test]
    async fn reaching_the_cap_completes() {
        let mut agent = test_support::savings_agent();
        agent.max_executions = Some(2);
        agent.execution_count = 1;
        let (store, reporter) = setup(&agent).await;

        let status = reporter.report(&agent, &executed(), Utc::now()).await.unwrap();
        assert_eq!(status, AgentStatus::Completed);
        assert_eq!(store.get(agent.id).await.unwrap().status, AgentStatus::Completed);
    }

    #[tokio::test]
    async fn filled_limit_order_completes_without_moving_schedule() {
        let agent = test_support::limit_order_agent("3000", Duration::days(1));
        let (store, reporter) = setup(&agent).await;

        let status = reporter.report(&agent, &executed(), Utc::now()).await.unwrap();
        let stored = store.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Completed);
        assert_eq!(stored.next_execution, agent.next_execution);
        assert_eq!(stored.execution_count, 1);
    }

    #[tokio::test]
    async fn failure_leaves_schedule_and_count() {
        let agent = test_support::dca_agent();
        let (store, reporter) = setup(&agent).await;

        let status = reporter
            .report(&agent, &failed(ExecutorError::Rpc("503".into())), Utc::now())
            .await
            .unwrap();
        let stored = store.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Active);
        assert_eq!(stored.next_execution, agent.next_execution);
        assert_eq!(stored.execution_count, 0);
        assert_eq!(stored.execution_logs.len(), 1);
    }

    #[tokio::test]
    async fn fifth_consecutive_failure_stops_agent() {
        let agent = test_support::dca_agent();
        let (store, reporter) = setup(&agent).await;
        let outcome = failed(ExecutorError::Rpc("timeout".into()));

        for _ in 0..4 {
            let status = reporter.report(&agent, &outcome, Utc::now()).await.unwrap();
            assert_eq!(status, AgentStatus::Active);
        }
        let status = reporter.report(&agent, &outcome, Utc::now()).await.unwrap();
        assert_eq!(status, AgentStatus::Failed);
        assert_eq!(store.get(agent.id).await.unwrap().status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn a_success_resets_the_failure_streak() {
        let agent = test_support::dca_agent();
        let (store, reporter) = setup(&agent).await;
        let outcome = failed(ExecutorError::Rpc("timeout".into()));

        for _ in 0..4 {
            reporter.report(&agent, &outcome, Utc::now()).await.unwrap();
        }
        reporter.report(&agent, &executed(), Utc::now()).await.unwrap();
        let current = store.get(agent.id).await.unwrap();
        for _ in 0..4 {
            let status = reporter.report(&current, &outcome, Utc::now()).await.unwrap();
            assert_eq!(status, AgentStatus::Active);
        }
    }

    #[tokio::test]
    async fn configuration_failure_is_immediately_fatal() {
        let agent = test_support::dca_agent();
        let (store, reporter) = setup(&agent).await;

        let status = reporter
            .report(&agent, &failed(ExecutorError::UnknownAgentType("grid".into())), Utc::now())
            .await
            .unwrap();
        assert_eq!(status, AgentStatus::Failed);
        assert_eq!(store.get(agent.id).await.unwrap().status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn skip_writes_nothing() {
        let agent = test_support::limit_order_agent("3000", Duration::days(1));
        let (store, reporter) = setup(&agent).await;
        let skip = StrategyOutcome::Skipped(PriceCheckResult {
            current_price: None,
            target_price: Default::default(),
            should_execute: false,
            reason: PriceCheckReason::Waiting,
        });

        reporter.report(&agent, &skip, Utc::now()).await.unwrap();
        let stored = store.get(agent.id).await.unwrap();
        assert!(stored.execution_logs.is_empty());
        assert_eq!(stored.next_execution, agent.next_execution);
    }

    #[tokio::test]
    async fn expiry_cancels_with_log() {
        let agent = test_support::limit_order_agent("3000", Duration::hours(-1));
        let (store, reporter) = setup(&agent).await;
        let expired = StrategyOutcome::Expired(PriceCheckResult {
            current_price: None,
            target_price: Default::default(),
            should_execute: false,
            reason: PriceCheckReason::Expired,
        });

        let status = reporter.report(&agent, &expired, Utc::now()).await.unwrap();
        let stored = store.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Cancelled);
        assert_eq!(stored.execution_logs[0].outcome, LogOutcome::Cancelled);
        assert_eq!(stored.execution_logs[0].error.as_deref(), Some("Order expired"));
    }

    #[tokio::test]
    async fn lost_log_write_still_advances_schedule() {
        let agent = test_support::dca_agent();
        let store = Arc::new(test_support::FlakyStore::new([agent.clone()]).failing_logs(1));
        let reporter = ResultReporter::new(store.clone());

        let status = reporter.report(&agent, &executed(), Utc::now()).await.unwrap();
        let stored = store.inner.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Active);
        assert_eq!(stored.next_execution, agent.next_execution + Duration::seconds(86400));
        assert_eq!(stored.execution_count, 1);
        assert!(stored.execution_logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_write_is_retried() {
        let agent = test_support::dca_agent();
        let store = Arc::new(test_support::FlakyStore::new([agent.clone()]).failing_schedules(2));
        let reporter = ResultReporter::new(store.clone());

        let status = reporter.report(&agent, &executed(), Utc::now()).await.unwrap();
        let stored = store.inner.get(agent.id).await.unwrap();
        assert_eq!(status, AgentStatus::Active);
        assert_eq!(stored.execution_count, 1);
        assert_eq!(stored.execution_logs.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecordable_execution_pauses_agent() {
        let agent = test_support::dca_agent();
        let store = Arc::new(test_support::FlakyStore::new([agent.clone()]).failing_schedules(3));
        let reporter = ResultReporter::new(store.clone());

        assert!(reporter.report(&agent, &executed(), Utc::now()).await.is_err());
        let stored = store.inner.get(agent.id).await.unwrap();
        assert_eq!(stored.status, AgentStatus::Paused);
        assert_eq!(stored.next_execution, agent.next_execution);
        assert!(!stored.is_due(Utc::now()));
    }
}
