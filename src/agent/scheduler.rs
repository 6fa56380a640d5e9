//! # Due-Agent Scheduler
//!
//! Fetches every due agent and processes them one at a time through the
//! router and reporter. A single scheduler instance owns the run state
//! (`idle -> running -> idle`); a trigger that arrives while a run is in
//! flight returns immediately instead of queueing. The state lives only in
//! memory, so a crash mid-run never blocks later runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::agent::reporter::ResultReporter;
use crate::agent::router::AgentRouter;
use crate::database::AgentStore;
use crate::error::ExecutorError;
use crate::models::{Agent, AgentStatus, ExecutionResult, StrategyOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-agent line of a run summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunDetail {
    pub agent_id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<AgentRunDetail>,
    /// Set when this trigger found another run in progress and did nothing.
    pub already_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            success: 0,
            failed: 0,
            skipped: 0,
            results: Vec::new(),
            already_running: false,
            error: None,
        }
    }

    fn record(&mut self, detail: AgentRunDetail) {
        match detail.status {
            RunStatus::Success => self.success += 1,
            RunStatus::Failed => self.failed += 1,
            RunStatus::Skipped => self.skipped += 1,
        }
        self.results.push(detail);
    }

    pub fn processed(&self) -> usize {
        self.results.len()
    }
}

/// Clears the running flag when dropped, including on panic or early return.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    store: Arc<dyn AgentStore>,
    router: AgentRouter,
    reporter: ResultReporter,
    agent_delay: Duration,
    running: AtomicBool,
    last_run: RwLock<Option<RunSummary>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn AgentStore>, router: AgentRouter, agent_delay: Duration) -> Self {
        Self {
            reporter: ResultReporter::new(store.clone()),
            store,
            router,
            agent_delay,
            running: AtomicBool::new(false),
            last_run: RwLock::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn last_run(&self) -> Option<RunSummary> {
        self.last_run.read().await.clone()
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    /// Process every agent due right now, earliest first.
    pub async fn run_once(&self) -> RunSummary {
        let started_at = Utc::now();
        let Some(_guard) = self.try_begin() else {
            info!("⏭️  Scheduler run already in progress, trigger ignored");
            return RunSummary {
                already_running: true,
                ..RunSummary::empty(started_at)
            };
        };

        let mut summary = RunSummary::empty(started_at);
        let due = match self.store.fetch_due_agents(started_at).await {
            Ok(due) => due,
            Err(e) => {
                error!("❌ Failed to fetch due agents: {:#}", e);
                summary.error = Some(format!("{:#}", e));
                summary.finished_at = Utc::now();
                return summary;
            }
        };

        info!("🚀 Scheduler run started: {} due agent(s)", due.len());
        for (i, agent) in due.iter().enumerate() {
            if i > 0 && !self.agent_delay.is_zero() {
                tokio::time::sleep(self.agent_delay).await;
            }
            let span = info_span!("agent", agent_id = %agent.id, agent_type = %agent.agent_type);
            let detail = self.process_due(agent).instrument(span).await;
            summary.record(detail);
        }

        summary.finished_at = Utc::now();
        info!(
            "✅ Scheduler run finished: {} success, {} failed, {} skipped",
            summary.success, summary.failed, summary.skipped
        );
        *self.last_run.write().await = Some(summary.clone());
        summary
    }

    async fn process_due(&self, listed: &Agent) -> AgentRunDetail {
        // Re-read so an agent paused or completed since the fetch is left alone.
        let agent = match self.store.fetch_agent_by_id(listed.id).await {
            Ok(Some(agent)) if agent.is_due(Utc::now()) => agent,
            Ok(_) => {
                info!("Agent {} no longer due, skipping", listed.id);
                return detail(listed, RunStatus::Skipped, None, Some("no longer due".to_string()));
            }
            Err(e) => {
                error!("Failed to reload agent {}: {:#}", listed.id, e);
                return detail(listed, RunStatus::Failed, None, Some(format!("{:#}", e)));
            }
        };

        let outcome = self.router.dispatch(&agent).await;
        let result = outcome.to_result();
        let status = match &outcome {
            StrategyOutcome::Executed(_) => RunStatus::Success,
            StrategyOutcome::Failed(_) => RunStatus::Failed,
            StrategyOutcome::Skipped(_) | StrategyOutcome::Expired(_) => RunStatus::Skipped,
        };

        if let Err(e) = self.reporter.report(&agent, &outcome, Utc::now()).await {
            error!("Failed to record outcome for agent {}: {:#}", agent.id, e);
            return detail(
                &agent,
                RunStatus::Failed,
                result.tx_hash.map(|h| h.to_string()),
                Some(format!("failed to record outcome: {:#}", e)),
            );
        }

        detail(&agent, status, result.tx_hash.map(|h| h.to_string()), result.error)
    }

    /// Execute one agent now, regardless of its schedule. Shares the run
    /// state with [`Scheduler::run_once`] so the two never overlap.
    pub async fn execute_agent(&self, id: Uuid, agent_type: &str) -> ExecutionResult {
        let Some(_guard) = self.try_begin() else {
            return rejected(ExecutorError::Internal("a scheduler run is in progress".to_string()));
        };

        let agent = match self.store.fetch_agent_by_id(id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => return rejected(ExecutorError::Store(anyhow::anyhow!("agent {} not found", id))),
            Err(e) => return rejected(ExecutorError::Store(e)),
        };
        if agent.agent_type != agent_type {
            return rejected(ExecutorError::Configuration(format!(
                "agent {} is a {} agent, not {}",
                id, agent.agent_type, agent_type
            )));
        }
        if agent.status != AgentStatus::Active {
            return rejected(ExecutorError::Configuration(format!("agent {} is {}", id, agent.status)));
        }

        let span = info_span!("manual_execution", agent_id = %agent.id, agent_type = %agent.agent_type);
        async {
            info!("Manual execution requested");
            let outcome = self.router.dispatch(&agent).await;
            if let Err(e) = self.reporter.report(&agent, &outcome, Utc::now()).await {
                error!("Failed to record outcome for agent {}: {:#}", agent.id, e);
            }
            outcome.to_result()
        }
        .instrument(span)
        .await
    }

    /// Run on a fixed interval until the process exits. Ticks missed while a
    /// run overruns are dropped, not replayed.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("⏰ Scheduler started, running every {:?}", interval);
            loop {
                ticker.tick().await;
                let summary = self.run_once().await;
                if let Some(e) = summary.error {
                    warn!("Scheduler run ended early: {}", e);
                }
            }
        })
    }
}

fn detail(agent: &Agent, status: RunStatus, tx_hash: Option<String>, error: Option<String>) -> AgentRunDetail {
    AgentRunDetail {
        agent_id: agent.id,
        name: agent.name.clone(),
        agent_type: agent.agent_type.clone(),
        status,
        tx_hash,
        error,
    }
}

/// A manual request refused before any strategy ran. Nothing is persisted.
fn rejected(err: ExecutorError) -> ExecutionResult {
    warn!("Manual execution rejected: {}", err);
    ExecutionResult::failed(&err, Vec::new())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{B256, U256};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::agent::strategy::Strategy;
    use crate::database::MemoryAgentStore;
    use crate::models::AgentType;
    use crate::test_support;

    /// Succeeds every time, counting calls.
    struct Counting {
        calls: std::sync::Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl Strategy for Counting {
        fn agent_type(&self) -> AgentType {
            AgentType::Dca
        }

        async fn execute(&self, agent: &Agent) -> StrategyOutcome {
            self.calls.lock().unwrap().push(agent.id);
            StrategyOutcome::Executed(ExecutionResult::succeeded(
                B256::repeat_byte(1),
                U256::from(1u64),
                U256::from(1u64),
                Vec::new(),
            ))
        }
    }

    /// Blocks inside `execute` until released.
    struct Blocking {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Strategy for Blocking {
        fn agent_type(&self) -> AgentType {
            AgentType::Dca
        }

        async fn execute(&self, _agent: &Agent) -> StrategyOutcome {
            self.entered.notify_one();
            self.release.notified().await;
            StrategyOutcome::Executed(ExecutionResult::succeeded(
                B256::repeat_byte(2),
                U256::from(1u64),
                U256::from(1u64),
                Vec::new(),
            ))
        }
    }

    fn counting_scheduler(agents: Vec<Agent>) -> (Arc<MemoryAgentStore>, Arc<Counting>, Scheduler) {
        let store = Arc::new(MemoryAgentStore::with_agents(agents));
        let strategy = Arc::new(Counting {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let router = AgentRouter::new().register(strategy.clone());
        let scheduler = Scheduler::new(store.clone(), router, Duration::ZERO);
        (store, strategy, scheduler)
    }

    #[tokio::test]
    async fn inactive_agents_are_never_dispatched() {
        let active = test_support::dca_agent();
        let mut paused = test_support::dca_agent();
        paused.status = AgentStatus::Paused;
        let mut failed = test_support::dca_agent();
        failed.status = AgentStatus::Failed;

        let (_, strategy, scheduler) = counting_scheduler(vec![active.clone(), paused, failed]);
        let summary = scheduler.run_once().await;

        assert_eq!(summary.success, 1);
        assert_eq!(*strategy.calls.lock().unwrap(), vec![active.id]);
    }

    #[tokio::test]
    async fn each_due_agent_runs_once_per_pass() {
        let agents = vec![test_support::dca_agent(), test_support::dca_agent()];
        let (_, strategy, scheduler) = counting_scheduler(agents);

        let summary = scheduler.run_once().await;
        assert_eq!(summary.processed(), 2);
        assert_eq!(strategy.calls.lock().unwrap().len(), 2);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(scheduler.last_run().await.is_some());
    }

    #[tokio::test]
    async fn one_bad_agent_does_not_stop_the_run() {
        let mut broken = test_support::dca_agent();
        broken.agent_type = "grid".to_string();
        broken.next_execution -= chrono::Duration::hours(1);
        let good = test_support::dca_agent();

        let (store, _, scheduler) = counting_scheduler(vec![broken.clone(), good]);
        let summary = scheduler.run_once().await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.results[0].agent_id, broken.id);
        assert_eq!(store.get(broken.id).await.unwrap().status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn concurrent_trigger_returns_immediately() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let store = Arc::new(MemoryAgentStore::with_agents([test_support::dca_agent()]));
        let router = AgentRouter::new().register(Arc::new(Blocking {
            entered: entered.clone(),
            release: release.clone(),
        }));
        let scheduler = Arc::new(Scheduler::new(store, router, Duration::ZERO));

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_once().await }
        });
        entered.notified().await;
        assert_eq!(scheduler.state(), SchedulerState::Running);

        let second = scheduler.run_once().await;
        assert!(second.already_running);
        assert_eq!(second.processed(), 0);

        let manual = scheduler.execute_agent(Uuid::new_v4(), "dca").await;
        assert!(!manual.success);

        release.notify_one();
        let first = first.await.unwrap();
        assert!(!first.already_running);
        assert_eq!(first.success, 1);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn manual_execution_reports_through_store() {
        let agent = test_support::dca_agent();
        let (store, _, scheduler) = counting_scheduler(vec![agent.clone()]);

        let result = scheduler.execute_agent(agent.id, "dca").await;
        assert!(result.success);
        assert_eq!(store.get(agent.id).await.unwrap().execution_count, 1);
    }

    #[tokio::test]
    async fn manual_execution_rejects_type_mismatch() {
        let agent = test_support::dca_agent();
        let (store, strategy, scheduler) = counting_scheduler(vec![agent.clone()]);

        let result = scheduler.execute_agent(agent.id, "savings").await;
        assert!(!result.success);
        assert!(strategy.calls.lock().unwrap().is_empty());
        assert!(store.get(agent.id).await.unwrap().execution_logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn agents_are_spaced_by_the_configured_delay() {
        let store = Arc::new(MemoryAgentStore::with_agents([
            test_support::dca_agent(),
            test_support::dca_agent(),
            test_support::dca_agent(),
        ]));
        let router = AgentRouter::new().register(Arc::new(Counting {
            calls: std::sync::Mutex::new(Vec::new()),
        }));
        let scheduler = Scheduler::new(store, router, Duration::from_secs(1));

        let start = tokio::time::Instant::now();
        let summary = scheduler.run_once().await;
        assert_eq!(summary.success, 3);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn lost_log_write_does_not_repeat_execution() {
        let agent = test_support::dca_agent();
        let store = Arc::new(test_support::FlakyStore::new([agent.clone()]).failing_logs(1));
        let strategy = Arc::new(Counting {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(store.clone(), AgentRouter::new().register(strategy.clone()), Duration::ZERO);

        let first = scheduler.run_once().await;
        assert_eq!(first.success, 1);
        let second = scheduler.run_once().await;
        assert_eq!(second.processed(), 0);

        assert_eq!(strategy.calls.lock().unwrap().len(), 1);
        assert_eq!(store.inner.get(agent.id).await.unwrap().execution_count, 1);
    }
}
