//! Auto-savings: deposit a fixed amount into a lending pool on the user's
//! behalf.

use alloy::primitives::U256;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::info;

use crate::agent::saga::Saga;
use crate::agent::strategy::{
    ExecutionContext, Fill, Strategy, approve, ensure_balance, ensure_delegate, ensure_positive, pull_funds, settle,
};
use crate::chain::TxRequest;
use crate::chain::contracts::ILendingPool;
use crate::error::ExecutorError;
use crate::models::{Agent, AgentType, SagaStep, SavingsConfig, StrategyOutcome};

pub struct SavingsStrategy {
    ctx: ExecutionContext,
}

impl SavingsStrategy {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    async fn run(&self, agent: &Agent, saga: &mut Saga<'_>) -> Result<Fill, ExecutorError> {
        ensure_delegate(agent, self.ctx.chain.as_ref())?;
        let cfg: SavingsConfig = agent.typed_config()?;
        ensure_positive(cfg.amount_per_execution, "amountPerExecution")?;

        ensure_balance(
            self.ctx.chain.as_ref(),
            Some(cfg.token),
            agent.user_address,
            cfg.amount_per_execution,
        )
        .await?;

        let gas = &self.ctx.gas;
        pull_funds(saga, agent, cfg.token, cfg.amount_per_execution, gas).await?;
        approve(saga, cfg.token, cfg.pool, cfg.amount_per_execution, gas).await?;

        // The deposit position is credited to the user, not the executor.
        let supply = ILendingPool::supplyCall {
            asset: cfg.token,
            amount: cfg.amount_per_execution,
            onBehalfOf: agent.user_address,
            referralCode: 0,
        };
        let tx = TxRequest {
            to: cfg.pool,
            value: U256::ZERO,
            data: supply.abi_encode().into(),
            gas_limit: gas.supply,
        };
        let tx_hash = saga.submit(SagaStep::Supply, tx).await?;
        info!("Savings agent {} supplied {} to {}", agent.id, cfg.amount_per_execution, cfg.pool);

        Ok(Fill {
            tx_hash,
            amount_in: cfg.amount_per_execution,
            amount_out: cfg.amount_per_execution,
        })
    }
}

#[async_trait]
impl Strategy for SavingsStrategy {
    fn agent_type(&self) -> AgentType {
        AgentType::Savings
    }

    async fn execute(&self, agent: &Agent) -> StrategyOutcome {
        let mut saga = Saga::new(self.ctx.chain.as_ref(), agent.id);
        let result = self.run(agent, &mut saga).await;
        settle(agent, result, saga)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GasLimits;
    use crate::error::FailureKind;
    use crate::test_support::{self, LENDING_POOL, MockChain, USDC, USER};

    fn strategy(chain: Arc<MockChain>) -> SavingsStrategy {
        SavingsStrategy::new(ExecutionContext {
            chain,
            gas: GasLimits::default(),
        })
    }

    #[tokio::test]
    async fn supplies_on_behalf_of_user() {
        let chain = Arc::new(MockChain::new().with_balance(USDC, USER, U256::from(25_000_000u64)));
        let StrategyOutcome::Executed(result) = strategy(chain.clone()).execute(&test_support::savings_agent()).await
        else {
            panic!("expected execution");
        };

        let sent = chain.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[2].to, LENDING_POOL);
        assert_eq!(sent[2].gas_limit, GasLimits::default().supply);

        let supply = ILendingPool::supplyCall::abi_decode(&sent[2].data).unwrap();
        assert_eq!(supply.onBehalfOf, USER);
        assert_eq!(supply.amount, U256::from(25_000_000u64));
        assert_eq!(result.steps.last().map(|s| s.step), Some(SagaStep::Supply));
    }

    #[tokio::test]
    async fn empty_wallet_is_reported() {
        let chain = Arc::new(MockChain::new());
        let StrategyOutcome::Failed(result) = strategy(chain.clone()).execute(&test_support::savings_agent()).await
        else {
            panic!("expected failure");
        };
        assert_eq!(result.failure, Some(FailureKind::InsufficientBalance));
        assert!(chain.sent().is_empty());
    }
}
