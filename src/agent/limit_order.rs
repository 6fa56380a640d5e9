//! # Limit Order Strategy
//!
//! Every pass starts with a price check:
//!
//! - **expired**: past `expiryTimestamp`. The order is cancelled without
//!   touching the chain.
//! - **waiting**: target not met. Skipped, nothing is mutated.
//! - **target met**: funds are pulled to the executor, the router is approved
//!   for the exact amount and the swap pays out to the user. Each transaction
//!   waits for inclusion before the next is sent.
//!
//! A quote failure is reported as a failed attempt and retried on the next
//! pass like any other failure.

use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::agent::saga::Saga;
use crate::agent::strategy::{
    ExecutionContext, Fill, Strategy, SwapLeg, ensure_balance, ensure_delegate, ensure_positive, execute_swap,
    settle,
};
use crate::error::ExecutorError;
use crate::models::{
    Agent, AgentType, Direction, LimitOrderConfig, PriceCheckReason, PriceCheckResult, StrategyOutcome,
};
use crate::services::price_oracle::{PriceOracle, min_amount_out};

pub struct LimitOrderStrategy {
    ctx: ExecutionContext,
    oracle: PriceOracle,
    swap_router: Address,
}

/// Both directions fire once the price reaches the target from below.
// Buy orders arguably should fire on a fall to the target; kept as deployed
// until that is settled with product.
pub fn target_met(_direction: Direction, current: Decimal, target: Decimal) -> bool {
    current >= target
}

impl LimitOrderStrategy {
    pub fn new(ctx: ExecutionContext, oracle: PriceOracle, swap_router: Address) -> Self {
        Self {
            ctx,
            oracle,
            swap_router,
        }
    }

    pub async fn check_price(&self, cfg: &LimitOrderConfig, now: DateTime<Utc>) -> PriceCheckResult {
        if now > cfg.expiry_timestamp {
            return PriceCheckResult {
                current_price: None,
                target_price: cfg.target_price,
                should_execute: false,
                reason: PriceCheckReason::Expired,
            };
        }

        let current = match self.oracle.spot_price(cfg.token_in, cfg.token_out, cfg.fee_tier).await {
            Ok(price) => price,
            Err(e) => {
                warn!("Price check {} -> {} failed: {}", cfg.token_in, cfg.token_out, e);
                return PriceCheckResult {
                    current_price: None,
                    target_price: cfg.target_price,
                    should_execute: false,
                    reason: PriceCheckReason::QuoteError,
                };
            }
        };

        let met = target_met(cfg.direction, current, cfg.target_price);
        PriceCheckResult {
            current_price: Some(current),
            target_price: cfg.target_price,
            should_execute: met,
            reason: if met { PriceCheckReason::TargetMet } else { PriceCheckReason::Waiting },
        }
    }

    async fn fill(&self, agent: &Agent, cfg: &LimitOrderConfig, saga: &mut Saga<'_>) -> Result<Fill, ExecutorError> {
        let expected_out = self
            .oracle
            .quote_exact_input(cfg.token_in, cfg.token_out, cfg.fee_tier, cfg.amount_in)
            .await?;
        let min_out = min_amount_out(expected_out, cfg.max_slippage_bps);

        ensure_balance(self.ctx.chain.as_ref(), Some(cfg.token_in), agent.user_address, cfg.amount_in).await?;

        let leg = SwapLeg {
            token_in: cfg.token_in,
            token_out: cfg.token_out,
            fee_tier: cfg.fee_tier,
            amount_in: cfg.amount_in,
            min_amount_out: min_out,
        };
        let tx_hash = execute_swap(saga, agent, &leg, self.swap_router, &self.ctx.gas).await?;

        Ok(Fill {
            tx_hash,
            amount_in: cfg.amount_in,
            amount_out: expected_out,
        })
    }
}

#[async_trait]
impl Strategy for LimitOrderStrategy {
    fn agent_type(&self) -> AgentType {
        AgentType::LimitOrder
    }

    async fn execute(&self, agent: &Agent) -> StrategyOutcome {
        let mut saga = Saga::new(self.ctx.chain.as_ref(), agent.id);

        let cfg = match agent.typed_config::<LimitOrderConfig>().and_then(|cfg| {
            ensure_positive(cfg.amount_in, "amountIn")?;
            Ok(cfg)
        }) {
            Ok(cfg) => cfg,
            Err(e) => return settle(agent, Err(e), saga),
        };

        let check = self.check_price(&cfg, Utc::now()).await;
        match check.reason {
            PriceCheckReason::Expired => {
                info!("Limit order {} expired at {}", agent.id, cfg.expiry_timestamp);
                return StrategyOutcome::Expired(check);
            }
            PriceCheckReason::Waiting => {
                info!("Limit order {} waiting: {}", agent.id, check);
                return StrategyOutcome::Skipped(check);
            }
            PriceCheckReason::QuoteError => {
                let err = ExecutorError::Quote(format!("price check failed: {}", check));
                return settle(agent, Err(err), saga);
            }
            PriceCheckReason::TargetMet => {
                info!("Limit order {} triggered: {}", agent.id, check);
            }
        }

        let result = match ensure_delegate(agent, self.ctx.chain.as_ref()) {
            Ok(()) => self.fill(agent, &cfg, &mut saga).await,
            Err(e) => Err(e),
        };
        settle(agent, result, saga)
    }
}
