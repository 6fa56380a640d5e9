//! # Chain Module
//!
//! Read and write access to the EVM node. The engine only talks to the chain
//! through [`ChainClient`], so strategies can be exercised against a scripted
//! client in tests.

pub mod contracts;
pub mod rpc;

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;

use crate::error::ExecutorError;

pub use rpc::RpcChainClient;

/// A transaction the session key signs and submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Explicit ceiling; every call type carries its own.
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the session key that signs every transaction.
    fn executor_address(&self) -> Address;

    /// Simulate a call against latest state; nothing is mutated.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ExecutorError>;

    async fn native_balance(&self, owner: Address) -> Result<U256, ExecutorError>;

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ExecutorError>;

    /// Block until the transaction is included and report its status.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, ExecutorError>;
}
