//! alloy-backed [`ChainClient`] signing with the executor's session key.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, ReceiptStatus, TxRequest};
use crate::config::ChainConfig;
use crate::error::ExecutorError;

pub struct RpcChainClient {
    provider: DynProvider,
    executor: Address,
    chain_id: u64,
    rpc_timeout: Duration,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RpcChainClient {
    /// Build the client. A missing or malformed session key is a
    /// configuration error: nothing can be executed without it.
    pub fn connect(config: &ChainConfig) -> Result<Self, ExecutorError> {
        let key = config
            .session_private_key
            .as_deref()
            .ok_or_else(|| ExecutorError::Configuration("SESSION_PRIVATE_KEY is not set".to_string()))?;
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| ExecutorError::Configuration(format!("invalid session key: {}", e)))?;
        let executor = signer.address();

        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| ExecutorError::Configuration(format!("invalid RPC_URL: {}", e)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        info!("🔑 Session executor {} on chain {}", executor, config.chain_id);

        Ok(Self {
            provider,
            executor,
            chain_id: config.chain_id,
            rpc_timeout: config.rpc_timeout,
            receipt_timeout: config.receipt_timeout,
            poll_interval: config.receipt_poll_interval,
        })
    }

    /// Compare the node's chain id with the configured one.
    pub async fn verify_chain_id(&self) -> Result<(), ExecutorError> {
        let remote = self.bounded("eth_chainId", async { self.provider.get_chain_id().await }).await?;
        if remote != self.chain_id {
            warn!("RPC node reports chain {} but CHAIN_ID is {}", remote, self.chain_id);
            return Err(ExecutorError::Configuration(format!(
                "chain id mismatch: node {} vs configured {}",
                remote, self.chain_id
            )));
        }
        Ok(())
    }

    async fn bounded<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, ExecutorError>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match timeout(self.rpc_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ExecutorError::Rpc(format!("{}: {}", what, e))),
            Err(_) => Err(ExecutorError::Timeout(self.rpc_timeout.as_secs(), what)),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn executor_address(&self) -> Address {
        self.executor
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ExecutorError> {
        let request = TransactionRequest::default()
            .with_from(self.executor)
            .with_to(to)
            .with_input(data);
        self.bounded("eth_call", async { self.provider.call(request).await }).await
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ExecutorError> {
        self.bounded("eth_getBalance", async { self.provider.get_balance(owner).await })
            .await
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ExecutorError> {
        let request = TransactionRequest::default()
            .with_from(self.executor)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.data)
            .with_gas_limit(tx.gas_limit)
            .with_chain_id(self.chain_id);

        let pending = self
            .bounded("eth_sendRawTransaction", async { self.provider.send_transaction(request).await })
            .await?;
        let tx_hash = *pending.tx_hash();
        debug!("Submitted transaction {} to {}", tx_hash, tx.to);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, ExecutorError> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let receipt = self
                .bounded("eth_getTransactionReceipt", async {
                    self.provider.get_transaction_receipt(tx_hash).await
                })
                .await?;

            if let Some(receipt) = receipt {
                return Ok(if ReceiptResponse::status(&receipt) {
                    ReceiptStatus::Success
                } else {
                    ReceiptStatus::Reverted
                });
            }

            if Instant::now() >= deadline {
                return Err(ExecutorError::Timeout(self.receipt_timeout.as_secs(), "transaction receipt"));
            }
            sleep(self.poll_interval).await;
        }
    }
}
