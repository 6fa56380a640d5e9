use alloy::primitives::{Address, B256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, ReceiptStatus, TxRequest};
use crate::error::ExecutorError;
use crate::models::{SagaStep, StepRecord, StepStatus};

/// Strictly sequential multi-transaction execution.
///
/// Each step is submitted only after the previous one is included, and every
/// step's outcome is recorded, so a failed sequence still tells an operator
/// exactly where it stopped.
pub struct Saga<'a> {
    chain: &'a dyn ChainClient,
    agent_id: Uuid,
    steps: Vec<StepRecord>,
}

impl<'a> Saga<'a> {
    pub fn new(chain: &'a dyn ChainClient, agent_id: Uuid) -> Self {
        Self {
            chain,
            agent_id,
            steps: Vec::new(),
        }
    }

    pub fn chain(&self) -> &'a dyn ChainClient {
        self.chain
    }

    pub fn executor(&self) -> Address {
        self.chain.executor_address()
    }

    /// Submit `tx` and wait for its receipt. A revert aborts the sequence.
    pub async fn submit(&mut self, step: SagaStep, tx: TxRequest) -> Result<B256, ExecutorError> {
        let tx_hash = self.chain.send_transaction(tx).await?;

        let status = match self.chain.wait_for_receipt(tx_hash).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Agent {} {} tx {} unconfirmed: {}", self.agent_id, step, tx_hash, e);
                self.record(step, tx_hash, StepStatus::Unconfirmed);
                return Err(e);
            }
        };

        match status {
            ReceiptStatus::Success => {
                info!("Agent {} {} confirmed: {}", self.agent_id, step, tx_hash);
                self.record(step, tx_hash, StepStatus::Confirmed);
                Ok(tx_hash)
            }
            ReceiptStatus::Reverted => {
                warn!("Agent {} {} reverted: {}", self.agent_id, step, tx_hash);
                self.record(step, tx_hash, StepStatus::Reverted);
                Err(ExecutorError::Reverted { step, tx_hash })
            }
        }
    }

    fn record(&mut self, step: SagaStep, tx_hash: B256, status: StepStatus) {
        self.steps.push(StepRecord { step, tx_hash, status });
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<StepRecord> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockChain;
    use alloy::primitives::{Bytes, U256};

    fn tx(byte: u8) -> TxRequest {
        TxRequest {
            to: Address::repeat_byte(byte),
            value: U256::ZERO,
            data: Bytes::new(),
            gas_limit: 21_000,
        }
    }

    #[tokio::test]
    async fn stops_at_first_revert_and_keeps_history() {
        let chain = MockChain::new().reverting_tx(1);
        let mut saga = Saga::new(&chain, Uuid::new_v4());

        saga.submit(SagaStep::RedeemTransfer, tx(1)).await.unwrap();
        let err = saga.submit(SagaStep::Approve, tx(2)).await.unwrap_err();

        assert!(matches!(err, ExecutorError::Reverted { step: SagaStep::Approve, .. }));
        let steps = saga.into_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].status, StepStatus::Confirmed);
        assert_eq!(steps[1].status, StepStatus::Reverted);
        assert_eq!(steps[1].tx_hash, MockChain::tx_hash(1));
    }

    #[tokio::test]
    async fn send_failure_records_nothing() {
        let chain = MockChain::new().with_failing_sends();
        let mut saga = Saga::new(&chain, Uuid::new_v4());
        assert!(saga.submit(SagaStep::RedeemPayment, tx(1)).await.is_err());
        assert!(saga.steps().is_empty());
    }
}
