//! Contract bindings and the small read helpers built on them.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::chain::ChainClient;
use crate::error::ExecutorError;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IQuoterV2 {
        struct QuoteExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint256 amountIn;
            uint24 fee;
            uint160 sqrtPriceLimitX96;
        }
        function quoteExactInputSingle(QuoteExactInputSingleParams memory params) external returns (uint256 amountOut, uint160 sqrtPriceX96After, uint32 initializedTicksCrossed, uint256 gasEstimate);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface ISwapRouter02 {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }
        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface ILendingPool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IDelegationManager {
        function redeemDelegations(bytes[] calldata permissionContexts, bytes32[] calldata modes, bytes[] calldata executionCallDatas) external;
    }
}

pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    IERC20::transferCall { to, amount }.abi_encode().into()
}

pub async fn erc20_balance(
    chain: &dyn ChainClient,
    token: Address,
    owner: Address,
) -> Result<U256, ExecutorError> {
    let data = IERC20::balanceOfCall { owner }.abi_encode();
    let ret = chain.call(token, data.into()).await?;
    Ok(IERC20::balanceOfCall::abi_decode_returns(&ret)?)
}

pub async fn erc20_decimals(chain: &dyn ChainClient, token: Address) -> Result<u8, ExecutorError> {
    let ret = chain.call(token, IERC20::decimalsCall {}.abi_encode().into()).await?;
    Ok(IERC20::decimalsCall::abi_decode_returns(&ret)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approve_selector_matches_erc20() {
        let data = approve_calldata(Address::repeat_byte(0x11), U256::from(5u64));
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(data.len(), 4 + 64);
    }

    #[test]
    fn transfer_selector_matches_erc20() {
        let data = transfer_calldata(Address::repeat_byte(0x22), U256::from(1u64));
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }
}
