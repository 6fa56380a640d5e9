use alloy::primitives::{Bytes, U256};
use async_trait::async_trait;
use tracing::info;

use crate::agent::saga::Saga;
use crate::agent::strategy::{ExecutionContext, Fill, Strategy, ensure_balance, ensure_delegate, ensure_positive, settle};
use crate::chain::contracts::transfer_calldata;
use crate::error::ExecutorError;
use crate::models::{Agent, AgentType, RecurringPaymentConfig, SagaStep, StrategyOutcome};
use crate::services::delegation::{Execution, redeem_request};

/// Pays a fixed amount straight from the user's account to the payee with a
/// single redemption. No funds pass through the executor.
pub struct RecurringPaymentStrategy {
    ctx: ExecutionContext,
}

impl RecurringPaymentStrategy {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    async fn run(&self, agent: &Agent, saga: &mut Saga<'_>) -> Result<Fill, ExecutorError> {
        ensure_delegate(agent, self.ctx.chain.as_ref())?;
        let cfg: RecurringPaymentConfig = agent.typed_config()?;
        ensure_positive(cfg.amount, "amount")?;

        ensure_balance(self.ctx.chain.as_ref(), cfg.token, agent.user_address, cfg.amount).await?;

        let execution = match cfg.token {
            Some(token) => Execution::new(token, U256::ZERO, transfer_calldata(cfg.recipient, cfg.amount)),
            None => Execution::new(cfg.recipient, cfg.amount, Bytes::new()),
        };
        let tx_hash = saga
            .submit(SagaStep::RedeemPayment, redeem_request(agent, &execution, self.ctx.gas.redeem))
            .await?;
        info!("Payment agent {} paid {} to {}", agent.id, cfg.amount, cfg.recipient);

        Ok(Fill {
            tx_hash,
            amount_in: cfg.amount,
            amount_out: cfg.amount,
        })
    }
}

#[async_trait]
impl Strategy for RecurringPaymentStrategy {
    fn agent_type(&self) -> AgentType {
        AgentType::RecurringPayment
    }

    async fn execute(&self, agent: &Agent) -> StrategyOutcome {
        let mut saga = Saga::new(self.ctx.chain.as_ref(), agent.id);
        let result = self.run(agent, &mut saga).await;
        settle(agent, result, saga)
    }
}
