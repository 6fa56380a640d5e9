//! # Agent Router
//!
//! Single dispatch point from an agent's declared type to its strategy. The
//! lookup table is built once at startup; the router holds no business logic.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use alloy::primitives::Address;
use futures::FutureExt;
use tracing::error;

use crate::agent::dca::DcaStrategy;
use crate::agent::limit_order::LimitOrderStrategy;
use crate::agent::recurring_payment::RecurringPaymentStrategy;
use crate::agent::savings::SavingsStrategy;
use crate::agent::strategy::{ExecutionContext, Strategy};
use crate::error::ExecutorError;
use crate::models::{Agent, AgentType, StrategyOutcome};
use crate::services::price_oracle::PriceOracle;

#[derive(Clone, Default)]
pub struct AgentRouter {
    strategies: HashMap<AgentType, Arc<dyn Strategy>>,
}

impl AgentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in strategy, sharing one chain client and oracle.
    pub fn with_defaults(ctx: ExecutionContext, quoter: Address, swap_router: Address) -> Self {
        let oracle = PriceOracle::new(ctx.chain.clone(), quoter);
        Self::new()
            .register(Arc::new(DcaStrategy::new(ctx.clone(), oracle.clone(), swap_router)))
            .register(Arc::new(LimitOrderStrategy::new(ctx.clone(), oracle, swap_router)))
            .register(Arc::new(SavingsStrategy::new(ctx.clone())))
            .register(Arc::new(RecurringPaymentStrategy::new(ctx)))
    }

    pub fn register(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.insert(strategy.agent_type(), strategy);
        self
    }

    pub fn strategy(&self, agent_type: AgentType) -> Option<&Arc<dyn Strategy>> {
        self.strategies.get(&agent_type)
    }

    /// Run the agent's strategy. Unknown types and panics come back as failed
    /// outcomes so one bad agent never takes down a scheduler run.
    pub async fn dispatch(&self, agent: &Agent) -> StrategyOutcome {
        let strategy = match agent.kind().and_then(|kind| {
            self.strategy(kind)
                .cloned()
                .ok_or_else(|| ExecutorError::Configuration(format!("no strategy registered for {}", kind)))
        }) {
            Ok(strategy) => strategy,
            Err(e) => {
                error!("Agent {} cannot be dispatched: {}", agent.id, e);
                return StrategyOutcome::failure(&e, Vec::new());
            }
        };

        match AssertUnwindSafe(strategy.execute(agent)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Strategy for agent {} panicked: {}", agent.id, message);
                StrategyOutcome::failure(&ExecutorError::Internal(message), Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::FailureKind;
    use crate::test_support;

    struct Panicking;

    #[async_trait]
    impl Strategy for Panicking {
        fn agent_type(&self) -> AgentType {
            AgentType::Savings
        }

        async fn execute(&self, _agent: &Agent) -> StrategyOutcome {
            panic!("pool address missing")
        }
    }

    #[tokio::test]
    async fn unknown_type_is_a_configuration_failure() {
        let mut agent = test_support::dca_agent();
        agent.agent_type = "yield-farm".to_string();

        let StrategyOutcome::Failed(result) = AgentRouter::new().dispatch(&agent).await else {
            panic!("expected failure");
        };
        assert_eq!(result.failure, Some(FailureKind::Configuration));
        assert!(result.error.unwrap().contains("yield-farm"));
    }

    #[tokio::test]
    async fn unregistered_type_is_a_configuration_failure() {
        let StrategyOutcome::Failed(result) = AgentRouter::new().dispatch(&test_support::dca_agent()).await else {
            panic!("expected failure");
        };
        assert_eq!(result.failure, Some(FailureKind::Configuration));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let router = AgentRouter::new().register(Arc::new(Panicking));
        let StrategyOutcome::Failed(result) = router.dispatch(&test_support::savings_agent()).await else {
            panic!("expected failure");
        };
        assert_eq!(result.failure, Some(FailureKind::Rpc));
        assert!(result.error.unwrap().contains("pool address missing"));
    }

    #[test]
    fn defaults_cover_every_type() {
        let chain = std::sync::Arc::new(test_support::MockChain::new());
        let ctx = ExecutionContext {
            chain,
            gas: Default::default(),
        };
        let router = AgentRouter::with_defaults(ctx, test_support::QUOTER, test_support::SWAP_ROUTER);
        for kind in AgentType::ALL {
            assert_eq!(router.strategy(kind).map(|s| s.agent_type()), Some(kind));
        }
    }
}
