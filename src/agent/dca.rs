//! Dollar-cost averaging: swap a fixed amount on a fixed cadence.

use alloy::primitives::Address;
use async_trait::async_trait;
use tracing::info;

use crate::agent::saga::Saga;
use crate::agent::strategy::{
    ExecutionContext, Fill, Strategy, SwapLeg, ensure_balance, ensure_delegate, ensure_positive, execute_swap,
    settle,
};
use crate::error::ExecutorError;
use crate::models::{Agent, AgentType, DcaConfig, StrategyOutcome};
use crate::services::price_oracle::{PriceOracle, min_amount_out};

pub struct DcaStrategy {
    ctx: ExecutionContext,
    oracle: PriceOracle,
    swap_router: Address,
}

impl DcaStrategy {
    pub fn new(ctx: ExecutionContext, oracle: PriceOracle, swap_router: Address) -> Self {
        Self {
            ctx,
            oracle,
            swap_router,
        }
    }

    async fn run(&self, agent: &Agent, saga: &mut Saga<'_>) -> Result<Fill, ExecutorError> {
        ensure_delegate(agent, self.ctx.chain.as_ref())?;
        let cfg: DcaConfig = agent.typed_config()?;
        ensure_positive(cfg.amount_per_execution, "amountPerExecution")?;

        let expected_out = self
            .oracle
            .quote_exact_input(cfg.token_in, cfg.token_out, cfg.fee_tier, cfg.amount_per_execution)
            .await?;
        let min_out = min_amount_out(expected_out, cfg.max_slippage_bps);
        info!(
            "DCA agent {}: {} in, expect {} out, floor {}",
            agent.id, cfg.amount_per_execution, expected_out, min_out
        );

        ensure_balance(
            self.ctx.chain.as_ref(),
            Some(cfg.token_in),
            agent.user_address,
            cfg.amount_per_execution,
        )
        .await?;

        let leg = SwapLeg {
            token_in: cfg.token_in,
            token_out: cfg.token_out,
            fee_tier: cfg.fee_tier,
            amount_in: cfg.amount_per_execution,
            min_amount_out: min_out,
        };
        let tx_hash = execute_swap(saga, agent, &leg, self.swap_router, &self.ctx.gas).await?;

        Ok(Fill {
            tx_hash,
            amount_in: cfg.amount_per_execution,
            amount_out: expected_out,
        })
    }
}

#[async_trait]
impl Strategy for DcaStrategy {
    fn agent_type(&self) -> AgentType {
        AgentType::Dca
    }

    async fn execute(&self, agent: &Agent) -> StrategyOutcome {
        let mut saga = Saga::new(self.ctx.chain.as_ref(), agent.id);
        let result = self.run(agent, &mut saga).await;
        settle(agent, result, saga)
    }
}
