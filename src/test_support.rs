//! Scripted chain client and agent fixtures shared by unit and integration
//! tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::chain::contracts::{IERC20, IQuoterV2};
use crate::chain::{ChainClient, ReceiptStatus, TxRequest};
use crate::error::ExecutorError;
use crate::database::{AgentStore, MemoryAgentStore};
use crate::models::{Agent, AgentStatus, AgentType, ExecutionLogEntry, ScheduleUpdate};

pub const EXECUTOR: Address = Address::repeat_byte(0xe0);
pub const USER: Address = Address::repeat_byte(0x05);
pub const DELEGATION_MANAGER: Address = Address::repeat_byte(0xdd);
pub const USDC: Address = Address::repeat_byte(0xc1);
pub const WETH: Address = Address::repeat_byte(0xe1);
pub const LENDING_POOL: Address = Address::repeat_byte(0xa1);
pub const PAYEE: Address = Address::repeat_byte(0xbe);
pub const SWAP_ROUTER: Address = Address::repeat_byte(0x5a);
pub const QUOTER: Address = Address::repeat_byte(0x9a);

#[derive(Default)]
struct MockState {
    token_balances: HashMap<(Address, Address), U256>,
    native_balances: HashMap<Address, U256>,
    decimals: HashMap<Address, u8>,
    quote: Option<U256>,
    quoted_amounts: Vec<U256>,
    sent: Vec<TxRequest>,
    reverting: HashSet<usize>,
    fail_sends: bool,
}

/// In-memory [`ChainClient`]. Answers `eth_call` by selector, hands out
/// sequential transaction hashes and reverts the submissions it was told to.
pub struct MockChain {
    executor: Address,
    state: Mutex<MockState>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            executor: EXECUTOR,
            state: Mutex::new(MockState {
                quote: Some(U256::ZERO),
                ..MockState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock chain lock poisoned")
    }

    pub fn with_balance(self, token: Address, owner: Address, amount: U256) -> Self {
        self.state().token_balances.insert((token, owner), amount);
        self
    }

    pub fn with_native_balance(self, owner: Address, amount: U256) -> Self {
        self.state().native_balances.insert(owner, amount);
        self
    }

    pub fn with_decimals(self, token: Address, decimals: u8) -> Self {
        self.state().decimals.insert(token, decimals);
        self
    }

    /// Every quoter call returns `amount_out`.
    pub fn with_quote(self, amount_out: U256) -> Self {
        self.state().quote = Some(amount_out);
        self
    }

    pub fn with_failing_quotes(self) -> Self {
        self.state().quote = None;
        self
    }

    /// The `index`-th submitted transaction (zero-based) reverts.
    pub fn reverting_tx(self, index: usize) -> Self {
        self.state().reverting.insert(index);
        self
    }

    pub fn with_failing_sends(self) -> Self {
        self.state().fail_sends = true;
        self
    }

    pub fn set_quote(&self, amount_out: U256) {
        self.state().quote = Some(amount_out);
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.state().sent.clone()
    }

    pub fn quoted_amounts(&self) -> Vec<U256> {
        self.state().quoted_amounts.clone()
    }

    pub fn tx_hash(index: usize) -> B256 {
        B256::from(U256::from(index as u64 + 1).to_be_bytes::<32>())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn executor_address(&self) -> Address {
        self.executor
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ExecutorError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| ExecutorError::Rpc("calldata too short".to_string()))?;
        let mut state = self.state();

        match selector {
            IERC20::balanceOfCall::SELECTOR => {
                let call = IERC20::balanceOfCall::abi_decode(&data)?;
                let balance = state
                    .token_balances
                    .get(&(to, call.owner))
                    .copied()
                    .unwrap_or_default();
                Ok(balance.abi_encode().into())
            }
            IERC20::decimalsCall::SELECTOR => {
                let decimals = state.decimals.get(&to).copied().unwrap_or(18);
                Ok(U256::from(decimals).abi_encode().into())
            }
            IQuoterV2::quoteExactInputSingleCall::SELECTOR => {
                let call = IQuoterV2::quoteExactInputSingleCall::abi_decode(&data)?;
                state.quoted_amounts.push(call.params.amountIn);
                let amount_out = state
                    .quote
                    .ok_or_else(|| ExecutorError::Rpc("execution reverted: SPL".to_string()))?;
                let mut out = amount_out.abi_encode();
                out.extend_from_slice(&[0u8; 96]);
                Ok(out.into())
            }
            other => Err(ExecutorError::Rpc(format!("unexpected call {:02x?} to {}", other, to))),
        }
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ExecutorError> {
        Ok(self.state().native_balances.get(&owner).copied().unwrap_or_default())
    }

    async fn send_transaction(&self, tx: TxRequest) -> Result<B256, ExecutorError> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(ExecutorError::Rpc("connection refused".to_string()));
        }
        state.sent.push(tx);
        Ok(Self::tx_hash(state.sent.len() - 1))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<ReceiptStatus, ExecutorError> {
        let index = U256::from_be_bytes(tx_hash.0).to::<u64>() as usize - 1;
        if self.state().reverting.contains(&index) {
            Ok(ReceiptStatus::Reverted)
        } else {
            Ok(ReceiptStatus::Success)
        }
    }
}

/// An active agent that became due a minute ago.
pub fn agent(agent_type: AgentType, config: serde_json::Value) -> Agent {
    Agent {
        id: Uuid::new_v4(),
        name: format!("{} agent", agent_type),
        user_address: USER,
        agent_type: agent_type.to_string(),
        permission_context: Bytes::from(vec![0x42; 64]),
        delegation_manager: DELEGATION_MANAGER,
        session_key_address: EXECUTOR,
        config,
        status: AgentStatus::Active,
        next_execution: Utc::now() - Duration::minutes(1),
        execution_count: 0,
        max_executions: None,
        execution_logs: Vec::new(),
    }
}

/// 100 USDC into WETH every day at 1% slippage.
pub fn dca_agent() -> Agent {
    agent(
        AgentType::Dca,
        json!({
            "tokenIn": USDC,
            "tokenOut": WETH,
            "amountPerExecution": "100000000",
            "intervalSeconds": 86400,
            "feeTier": 500,
            "maxSlippageBps": 100
        }),
    )
}

pub fn limit_order_agent(target_price: &str, expires_in: Duration) -> Agent {
    agent(
        AgentType::LimitOrder,
        json!({
            "tokenIn": WETH,
            "tokenOut": USDC,
            "amountIn": "500000000000000000",
            "targetPrice": target_price,
            "direction": "sell",
            "feeTier": 500,
            "expiryTimestamp": Utc::now() + expires_in,
            "maxSlippageBps": 50
        }),
    )
}

pub fn savings_agent() -> Agent {
    agent(
        AgentType::Savings,
        json!({
            "token": USDC,
            "pool": LENDING_POOL,
            "amountPerExecution": "25000000",
            "intervalSeconds": 604800
        }),
    )
}

pub fn payment_agent(token: Option<Address>) -> Agent {
    agent(
        AgentType::RecurringPayment,
        json!({
            "token": token,
            "recipient": PAYEE,
            "amount": "10000000",
            "intervalSeconds": 2592000
        }),
    )
}

/// [`MemoryAgentStore`] whose log and schedule writes fail a set number of
/// times before going through.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryAgentStore,
    log_failures: AtomicUsize,
    schedule_failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new(agents: impl IntoIterator<Item = Agent>) -> Self {
        Self {
            inner: MemoryAgentStore::with_agents(agents),
            ..Self::default()
        }
    }

    pub fn failing_logs(self, times: usize) -> Self {
        self.log_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_schedules(self, times: usize) -> Self {
        self.schedule_failures.store(times, Ordering::SeqCst);
        self
    }

    fn trip(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl AgentStore for FlakyStore {
    async fn fetch_due_agents(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Agent>> {
        self.inner.fetch_due_agents(now).await
    }

    async fn fetch_agent_by_id(&self, id: Uuid) -> anyhow::Result<Option<Agent>> {
        self.inner.fetch_agent_by_id(id).await
    }

    async fn append_execution_log(&self, id: Uuid, entry: &ExecutionLogEntry) -> anyhow::Result<()> {
        if Self::trip(&self.log_failures) {
            anyhow::bail!("connection reset while appending log");
        }
        self.inner.append_execution_log(id, entry).await
    }

    async fn update_schedule(&self, id: Uuid, update: ScheduleUpdate) -> anyhow::Result<()> {
        if Self::trip(&self.schedule_failures) {
            anyhow::bail!("connection reset while updating schedule");
        }
        self.inner.update_schedule(id, update).await
    }

    async fn update_status(&self, id: Uuid, status: AgentStatus) -> anyhow::Result<()> {
        self.inner.update_status(id, status).await
    }

    async fn recent_logs(&self, id: Uuid, limit: usize) -> anyhow::Result<Vec<ExecutionLogEntry>> {
        self.inner.recent_logs(id, limit).await
    }
}
