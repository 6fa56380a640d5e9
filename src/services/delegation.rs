//! # Delegation Redeemer
//!
//! Encodes a single authorized call for the delegation manager and submits it
//! with the agent's stored permission context. The layout must match the
//! contract exactly; a mismatch surfaces as a revert.

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::SolCall;
use tracing::info;

use crate::chain::TxRequest;
use crate::chain::contracts::IDelegationManager;
use crate::models::Agent;

/// Execution mode marker: call type `single`, exec type `default`.
pub const SINGLE_DEFAULT_MODE: B256 = B256::ZERO;

/// One call the delegator's account performs on redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub target: Address,
    pub value: U256,
    pub call_data: Bytes,
}

impl Execution {
    pub fn new(target: Address, value: U256, call_data: Bytes) -> Self {
        Self { target, value, call_data }
    }

    /// Packed `target (20) || value (32) || callData`.
    pub fn encode_packed(&self) -> Bytes {
        let mut out = Vec::with_capacity(20 + 32 + self.call_data.len());
        out.extend_from_slice(self.target.as_slice());
        out.extend_from_slice(&self.value.to_be_bytes::<32>());
        out.extend_from_slice(&self.call_data);
        out.into()
    }
}

/// `redeemDelegations` calldata for a single execution.
pub fn redeem_calldata(permission_context: &Bytes, execution: &Execution) -> Bytes {
    IDelegationManager::redeemDelegationsCall {
        permissionContexts: vec![permission_context.clone()],
        modes: vec![SINGLE_DEFAULT_MODE],
        executionCallDatas: vec![execution.encode_packed()],
    }
    .abi_encode()
    .into()
}

/// Transaction redeeming the agent's delegation through its own manager.
pub fn redeem_request(agent: &Agent, execution: &Execution, gas_limit: u64) -> TxRequest {
    info!(
        "Redeeming delegation for agent {} via {} -> {}",
        agent.id, agent.delegation_manager, execution.target
    );
    TxRequest {
        to: agent.delegation_manager,
        value: U256::ZERO,
        data: redeem_calldata(&agent.permission_context, execution),
        gas_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contracts::transfer_calldata;

    #[test]
    fn packed_execution_layout() {
        let execution = Execution::new(
            Address::repeat_byte(0xaa),
            U256::from(0x0102u64),
            Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        );
        let packed = execution.encode_packed();

        assert_eq!(packed.len(), 20 + 32 + 4);
        assert!(packed[..20].iter().all(|b| *b == 0xaa));
        assert!(packed[20..50].iter().all(|b| *b == 0));
        assert_eq!(&packed[50..52], &[0x01, 0x02]);
        assert_eq!(&packed[52..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn native_transfer_has_empty_call_data() {
        let execution = Execution::new(Address::repeat_byte(1), U256::from(7u64), Bytes::new());
        assert_eq!(execution.encode_packed().len(), 52);
    }

    #[test]
    fn redeem_calldata_round_trips_through_abi() {
        let context = Bytes::from(vec![0x12; 96]);
        let execution = Execution::new(
            Address::repeat_byte(0x33),
            U256::ZERO,
            transfer_calldata(Address::repeat_byte(0x44), U256::from(1_000_000u64)),
        );

        let data = redeem_calldata(&context, &execution);
        assert_eq!(&data[..4], IDelegationManager::redeemDelegationsCall::SELECTOR.as_slice());

        let decoded = IDelegationManager::redeemDelegationsCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.permissionContexts, vec![context]);
        assert_eq!(decoded.modes, vec![SINGLE_DEFAULT_MODE]);
        assert_eq!(decoded.executionCallDatas, vec![execution.encode_packed()]);
    }
}
