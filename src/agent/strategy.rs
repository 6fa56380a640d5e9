use std::sync::Arc;

use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::agent::saga::Saga;
use crate::chain::contracts::{ISwapRouter02, approve_calldata, erc20_balance, transfer_calldata};
use crate::chain::{ChainClient, TxRequest};
use crate::config::GasLimits;
use crate::error::ExecutorError;
use crate::models::{Agent, AgentType, ExecutionResult, SagaStep, StrategyOutcome};
use crate::services::delegation::{Execution, redeem_request};

/// One execution strategy per agent type.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn agent_type(&self) -> AgentType;

    /// Run one due invocation. Failures come back as
    /// [`StrategyOutcome::Failed`], never as a panic or an error.
    async fn execute(&self, agent: &Agent) -> StrategyOutcome;
}

/// Collaborators every strategy shares.
#[derive(Clone)]
pub struct ExecutionContext {
    pub chain: Arc<dyn ChainClient>,
    pub gas: GasLimits,
}

/// What a completed execution moved.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub tx_hash: B256,
    pub amount_in: U256,
    /// Quoted output for swaps; the transferred amount otherwise.
    pub amount_out: U256,
}

/// Turn a strategy body's result plus its saga history into an outcome.
pub fn settle(agent: &Agent, result: Result<Fill, ExecutorError>, saga: Saga<'_>) -> StrategyOutcome {
    match result {
        Ok(fill) => StrategyOutcome::Executed(ExecutionResult::succeeded(
            fill.tx_hash,
            fill.amount_in,
            fill.amount_out,
            saga.into_steps(),
        )),
        Err(e) => {
            warn!("Agent {} ({}) execution failed: {}", agent.id, agent.agent_type, e);
            StrategyOutcome::failure(&e, saga.into_steps())
        }
    }
}

/// The delegation must have been granted to this process's session key,
/// otherwise every redemption would revert.
pub fn ensure_delegate(agent: &Agent, chain: &dyn ChainClient) -> Result<(), ExecutorError> {
    let executor = chain.executor_address();
    if agent.session_key_address != executor {
        return Err(ExecutorError::Configuration(format!(
            "agent {} delegates to {} but this executor signs as {}",
            agent.id, agent.session_key_address, executor
        )));
    }
    Ok(())
}

pub fn ensure_positive(amount: U256, field: &str) -> Result<(), ExecutorError> {
    if amount.is_zero() {
        return Err(ExecutorError::InvalidConfig(format!("{} must be greater than zero", field)));
    }
    Ok(())
}

/// Insufficient balance is a reported failure, not a skip. `None` checks the
/// native balance.
pub async fn ensure_balance(
    chain: &dyn ChainClient,
    token: Option<Address>,
    owner: Address,
    required: U256,
) -> Result<(), ExecutorError> {
    let available = match token {
        Some(token) => erc20_balance(chain, token, owner).await?,
        None => chain.native_balance(owner).await?,
    };
    debug!("Balance of {} is {} (need {})", owner, available, required);
    if available < required {
        return Err(ExecutorError::InsufficientBalance {
            available: available.to_string(),
            required: required.to_string(),
        });
    }
    Ok(())
}

/// Redeem the delegation so `amount` of `token` moves from the user to the
/// executor.
pub async fn pull_funds(
    saga: &mut Saga<'_>,
    agent: &Agent,
    token: Address,
    amount: U256,
    gas: &GasLimits,
) -> Result<B256, ExecutorError> {
    let execution = Execution::new(token, U256::ZERO, transfer_calldata(saga.executor(), amount));
    saga.submit(SagaStep::RedeemTransfer, redeem_request(agent, &execution, gas.redeem))
        .await
}

pub async fn approve(
    saga: &mut Saga<'_>,
    token: Address,
    spender: Address,
    amount: U256,
    gas: &GasLimits,
) -> Result<B256, ExecutorError> {
    let tx = TxRequest {
        to: token,
        value: U256::ZERO,
        data: approve_calldata(spender, amount),
        gas_limit: gas.approve,
    };
    saga.submit(SagaStep::Approve, tx).await
}

#[derive(Debug, Clone, Copy)]
pub struct SwapLeg {
    pub token_in: Address,
    pub token_out: Address,
    pub fee_tier: u32,
    pub amount_in: U256,
    pub min_amount_out: U256,
}

/// Pull funds, approve the router for the exact amount, then swap with the
/// user as recipient. Returns the swap transaction hash.
pub async fn execute_swap(
    saga: &mut Saga<'_>,
    agent: &Agent,
    leg: &SwapLeg,
    router: Address,
    gas: &GasLimits,
) -> Result<B256, ExecutorError> {
    let fee = U24::try_from(leg.fee_tier)
        .map_err(|_| ExecutorError::InvalidConfig(format!("fee tier {} out of range", leg.fee_tier)))?;

    pull_funds(saga, agent, leg.token_in, leg.amount_in, gas).await?;
    approve(saga, leg.token_in, router, leg.amount_in, gas).await?;

    let swap = ISwapRouter02::exactInputSingleCall {
        params: ISwapRouter02::ExactInputSingleParams {
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
            fee,
            recipient: agent.user_address,
            amountIn: leg.amount_in,
            amountOutMinimum: leg.min_amount_out,
            sqrtPriceLimitX96: U160::ZERO,
        },
    };
    let tx = TxRequest {
        to: router,
        value: U256::ZERO,
        data: swap.abi_encode().into(),
        gas_limit: gas.swap,
    };
    saga.submit(SagaStep::Swap, tx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, MockChain, USDC, USER};

    #[test]
    fn foreign_session_key_is_a_configuration_error() {
        let chain = MockChain::new();
        let mut agent = test_support::dca_agent();
        assert!(ensure_delegate(&agent, &chain).is_ok());

        agent.session_key_address = Address::repeat_byte(0x77);
        let err = ensure_delegate(&agent, &chain).unwrap_err();
        assert!(err.kind().is_fatal());
    }

    #[tokio::test]
    async fn balance_shortfall_reports_both_amounts() {
        let chain = MockChain::new().with_balance(USDC, USER, U256::from(5u64));
        let err = ensure_balance(&chain, Some(USDC), USER, U256::from(6u64))
            .await
            .unwrap_err();
        match err {
            ExecutorError::InsufficientBalance { available, required } => {
                assert_eq!(available, "5");
                assert_eq!(required, "6");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ensure_balance(&chain, Some(USDC), USER, U256::from(5u64)).await.is_ok());
    }

    #[tokio::test]
    async fn native_balance_checked_when_no_token() {
        let chain = MockChain::new().with_native_balance(USER, U256::from(10u64));
        assert!(ensure_balance(&chain, None, USER, U256::from(10u64)).await.is_ok());
        assert!(ensure_balance(&chain, None, USER, U256::from(11u64)).await.is_err());
    }
}
