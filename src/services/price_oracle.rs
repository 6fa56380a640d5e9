//! # Price Oracle Adapter
//!
//! Prices come from simulating the concentrated-liquidity quoter; nothing is
//! submitted. Amounts stay integral until they are normalized for display or
//! limit-order comparison.

use std::sync::Arc;

use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use tracing::debug;

use crate::chain::ChainClient;
use crate::chain::contracts::{IQuoterV2, erc20_decimals};
use crate::error::ExecutorError;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Clone)]
pub struct PriceOracle {
    chain: Arc<dyn ChainClient>,
    quoter: Address,
}

impl PriceOracle {
    pub fn new(chain: Arc<dyn ChainClient>, quoter: Address) -> Self {
        Self { chain, quoter }
    }

    /// Expected output for `amount_in`, in raw units of `token_out`.
    pub async fn quote_exact_input(
        &self,
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
        amount_in: U256,
    ) -> Result<U256, ExecutorError> {
        let fee = U24::try_from(fee_tier)
            .map_err(|_| ExecutorError::InvalidConfig(format!("fee tier {} out of range", fee_tier)))?;
        let call = IQuoterV2::quoteExactInputSingleCall {
            params: IQuoterV2::QuoteExactInputSingleParams {
                tokenIn: token_in,
                tokenOut: token_out,
                amountIn: amount_in,
                fee,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };

        let ret = self
            .chain
            .call(self.quoter, call.abi_encode().into())
            .await
            .map_err(|e| ExecutorError::Quote(e.to_string()))?;
        let decoded = IQuoterV2::quoteExactInputSingleCall::abi_decode_returns(&ret)
            .map_err(|e| ExecutorError::Quote(format!("undecodable quoter response: {}", e)))?;

        debug!("Quoted {} {} -> {} {}", amount_in, token_in, decoded.amountOut, token_out);
        Ok(decoded.amountOut)
    }

    /// Output-per-input price for one whole unit of `token_in`.
    pub async fn spot_price(
        &self,
        token_in: Address,
        token_out: Address,
        fee_tier: u32,
    ) -> Result<Decimal, ExecutorError> {
        let decimals_in = erc20_decimals(self.chain.as_ref(), token_in)
            .await
            .map_err(|e| ExecutorError::Quote(format!("decimals of {}: {}", token_in, e)))?;
        let decimals_out = erc20_decimals(self.chain.as_ref(), token_out)
            .await
            .map_err(|e| ExecutorError::Quote(format!("decimals of {}: {}", token_out, e)))?;

        let one_unit = U256::from(10u64).pow(U256::from(decimals_in));
        let amount_out = self.quote_exact_input(token_in, token_out, fee_tier, one_unit).await?;

        let input = normalize(one_unit, decimals_in)?;
        let output = normalize(amount_out, decimals_out)?;
        output
            .checked_div(input)
            .ok_or_else(|| ExecutorError::Quote("price division overflow".to_string()))
    }
}

/// Raw token units to a decimal amount using the token's precision.
pub fn normalize(amount: U256, decimals: u8) -> Result<Decimal, ExecutorError> {
    if amount > U256::from(i128::MAX as u128) {
        return Err(ExecutorError::Quote(format!("amount {} too large to price", amount)));
    }
    let raw = amount.to::<u128>() as i128;
    Decimal::try_from_i128_with_scale(raw, u32::from(decimals))
        .map_err(|e| ExecutorError::Quote(format!("cannot normalize {} at {} decimals: {}", amount, decimals, e)))
}

/// Slippage floor: `expected * (10000 - bps) / 10000`, truncating.
pub fn min_amount_out(expected_out: U256, max_slippage_bps: u16) -> U256 {
    let keep = BPS_DENOMINATOR.saturating_sub(u64::from(max_slippage_bps));
    expected_out.saturating_mul(U256::from(keep)) / U256::from(BPS_DENOMINATOR)
}
