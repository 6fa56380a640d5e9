//! Agent records, per-type configuration and execution outcomes.
//!
//! The store owns these records; the engine only mutates the scheduling
//! fields (`status`, `next_execution`, `execution_count`) and appends log
//! entries.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExecutorError, FailureKind};

/// Closed set of agent types. Adding one means adding a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    Dca,
    LimitOrder,
    Savings,
    RecurringPayment,
}

impl AgentType {
    pub const ALL: [AgentType; 4] = [
        AgentType::Dca,
        AgentType::LimitOrder,
        AgentType::Savings,
        AgentType::RecurringPayment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Dca => "dca",
            AgentType::LimitOrder => "limit-order",
            AgentType::Savings => "savings",
            AgentType::RecurringPayment => "recurring-payment",
        }
    }

    /// One-shot agents complete after their first successful execution.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, AgentType::LimitOrder)
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = ExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ExecutorError::UnknownAgentType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Active => "active",
            AgentStatus::Paused => "paused",
            AgentStatus::Completed => "completed",
            AgentStatus::Cancelled => "cancelled",
            AgentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AgentStatus::Active),
            "paused" => Ok(AgentStatus::Paused),
            "completed" => Ok(AgentStatus::Completed),
            "cancelled" => Ok(AgentStatus::Cancelled),
            "failed" => Ok(AgentStatus::Failed),
            other => anyhow::bail!("unknown agent status: {}", other),
        }
    }
}

/// A persisted, user-authorized recurring instruction and its scheduling state.
///
/// `agent_type` and `config` are kept as the store hands them over; the router
/// resolves the type and each strategy decodes its own typed configuration, so
/// a malformed record fails that one agent rather than the whole fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub user_address: Address,
    pub agent_type: String,
    pub permission_context: Bytes,
    pub delegation_manager: Address,
    pub session_key_address: Address,
    pub config: serde_json::Value,
    pub status: AgentStatus,
    pub next_execution: DateTime<Utc>,
    pub execution_count: u32,
    pub max_executions: Option<u32>,
    #[serde(default)]
    pub execution_logs: Vec<ExecutionLogEntry>,
}

impl Agent {
    pub fn kind(&self) -> Result<AgentType, ExecutorError> {
        self.agent_type.parse()
    }

    pub fn typed_config<T: DeserializeOwned>(&self) -> Result<T, ExecutorError> {
        serde_json::from_value(self.config.clone())
            .map_err(|e| ExecutorError::InvalidConfig(format!("{} agent {}: {}", self.agent_type, self.id, e)))
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == AgentStatus::Active && self.next_execution <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcaConfig {
    pub token_in: Address,
    pub token_out: Address,
    #[serde(with = "u256_dec")]
    pub amount_per_execution: U256,
    pub interval_seconds: u64,
    pub fee_tier: u32,
    pub max_slippage_bps: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrderConfig {
    pub token_in: Address,
    pub token_out: Address,
    #[serde(with = "u256_dec")]
    pub amount_in: U256,
    pub target_price: Decimal,
    pub direction: Direction,
    pub fee_tier: u32,
    pub expiry_timestamp: DateTime<Utc>,
    #[serde(default = "default_limit_slippage_bps")]
    pub max_slippage_bps: u16,
}

fn default_limit_slippage_bps() -> u16 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsConfig {
    pub token: Address,
    /// Yield-bearing deposit contract (an Aave-style lending pool).
    pub pool: Address,
    #[serde(with = "u256_dec")]
    pub amount_per_execution: U256,
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringPaymentConfig {
    /// `None` pays in the chain's native currency.
    #[serde(default)]
    pub token: Option<Address>,
    pub recipient: Address,
    #[serde(with = "u256_dec")]
    pub amount: U256,
    pub interval_seconds: u64,
}

/// Steps of a multi-transaction execution, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SagaStep {
    RedeemTransfer,
    Approve,
    Swap,
    Supply,
    RedeemPayment,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SagaStep::RedeemTransfer => "redeem-transfer",
            SagaStep::Approve => "approve",
            SagaStep::Swap => "swap",
            SagaStep::Supply => "supply",
            SagaStep::RedeemPayment => "redeem-payment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Confirmed,
    Reverted,
    /// Submitted but no receipt was obtained; the transaction may still land.
    Unconfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: SagaStep,
    pub tx_hash: B256,
    pub status: StepStatus,
}

/// Outcome of one strategy invocation.
///
/// On success `tx_hash`, `amount_in` and `amount_out` are all present; build it
/// through [`ExecutionResult::succeeded`] or [`ExecutionResult::failed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub tx_hash: Option<B256>,
    #[serde(with = "u256_dec::option", default)]
    pub amount_in: Option<U256>,
    #[serde(with = "u256_dec::option", default)]
    pub amount_out: Option<U256>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl ExecutionResult {
    pub fn succeeded(tx_hash: B256, amount_in: U256, amount_out: U256, steps: Vec<StepRecord>) -> Self {
        Self {
            success: true,
            tx_hash: Some(tx_hash),
            amount_in: Some(amount_in),
            amount_out: Some(amount_out),
            error: None,
            failure: None,
            steps,
        }
    }

    /// A failed attempt. The hash is the reverted transaction if there was one,
    /// otherwise the last confirmed step, so recovery can start from there.
    pub fn failed(error: &ExecutorError, steps: Vec<StepRecord>) -> Self {
        let tx_hash = error.tx_hash().or_else(|| steps.last().map(|s| s.tx_hash));
        Self {
            success: false,
            tx_hash,
            amount_in: None,
            amount_out: None,
            error: Some(error.to_string()),
            failure: Some(error.kind()),
            steps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceCheckReason {
    TargetMet,
    Waiting,
    Expired,
    QuoteError,
}

/// Transient limit-order price evaluation; only ever persisted as a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceCheckResult {
    pub current_price: Option<Decimal>,
    pub target_price: Decimal,
    pub should_execute: bool,
    pub reason: PriceCheckReason,
}

impl fmt::Display for PriceCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current_price {
            Some(current) => write!(
                f,
                "{:?}: current price {} vs target {}",
                self.reason, current, self.target_price
            ),
            None => write!(f, "{:?}: target {}", self.reason, self.target_price),
        }
    }
}

/// What a strategy decided and did for one due agent.
#[derive(Debug, Clone)]
pub enum StrategyOutcome {
    Executed(ExecutionResult),
    Failed(ExecutionResult),
    /// A decision not to act this pass. Never counted as a failure.
    Skipped(PriceCheckResult),
    /// Limit order past its expiry; the agent is cancelled.
    Expired(PriceCheckResult),
}

impl StrategyOutcome {
    pub fn failure(error: &ExecutorError, steps: Vec<StepRecord>) -> Self {
        StrategyOutcome::Failed(ExecutionResult::failed(error, steps))
    }

    /// Payload handed back to trigger callers.
    pub fn to_result(&self) -> ExecutionResult {
        match self {
            StrategyOutcome::Executed(result) | StrategyOutcome::Failed(result) => result.clone(),
            StrategyOutcome::Skipped(check) => ExecutionResult {
                success: true,
                tx_hash: None,
                amount_in: None,
                amount_out: None,
                error: Some(format!("Skipped: {}", check)),
                failure: None,
                steps: Vec::new(),
            },
            StrategyOutcome::Expired(_) => ExecutionResult {
                success: false,
                tx_hash: None,
                amount_in: None,
                amount_out: None,
                error: Some("Order expired".to_string()),
                failure: None,
                steps: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutcome {
    Success,
    Failure,
    Cancelled,
}

impl LogOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Failure => "failure",
            LogOutcome::Cancelled => "cancelled",
        }
    }
}

impl FromStr for LogOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LogOutcome::Success),
            "failure" => Ok(LogOutcome::Failure),
            "cancelled" => Ok(LogOutcome::Cancelled),
            other => anyhow::bail!("unknown log outcome: {}", other),
        }
    }
}

/// Append-only record of one execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub outcome: LogOutcome,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
    #[serde(with = "u256_dec::option", default)]
    pub amount_in: Option<U256>,
    #[serde(with = "u256_dec::option", default)]
    pub amount_out: Option<U256>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl ExecutionLogEntry {
    pub fn from_result(result: &ExecutionResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            outcome: if result.success { LogOutcome::Success } else { LogOutcome::Failure },
            tx_hash: result.tx_hash,
            error: result.error.clone(),
            amount_in: result.amount_in,
            amount_out: result.amount_out,
            steps: result.steps.clone(),
        }
    }

    pub fn cancelled(reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            outcome: LogOutcome::Cancelled,
            tx_hash: None,
            error: Some(reason.to_string()),
            amount_in: None,
            amount_out: None,
            steps: Vec::new(),
        }
    }
}

/// Scheduling fields written back after a successful execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleUpdate {
    pub next_execution: DateTime<Utc>,
    pub execution_count: u32,
    pub status: AgentStatus,
}

/// Serde for token amounts as decimal strings. Accepts decimal or `0x` hex
/// strings, and plain JSON integers.
pub mod u256_dec {
    use std::str::FromStr;

    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
    }

    fn parse<E: Error>(raw: Raw) -> Result<U256, E> {
        match raw {
            Raw::Text(s) => U256::from_str(s.trim()).map_err(E::custom),
            Raw::Int(n) => Ok(U256::from(n)),
        }
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        parse(Raw::deserialize(deserializer)?)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<U256>, D::Error> {
            Option::<Raw>::deserialize(deserializer)?.map(parse).transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_type_round_trips_through_strings() {
        assert_eq!("limit-order".parse::<AgentType>().unwrap(), AgentType::LimitOrder);
        assert_eq!(AgentType::RecurringPayment.to_string(), "recurring-payment");
        assert!(matches!(
            "grid".parse::<AgentType>(),
            Err(ExecutorError::UnknownAgentType(t)) if t == "grid"
        ));
    }

    #[test]
    fn dca_config_accepts_decimal_and_hex_amounts() {
        let cfg: DcaConfig = serde_json::from_value(json!({
            "tokenIn": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "tokenOut": "0x4200000000000000000000000000000000000006",
            "amountPerExecution": "100000000",
            "intervalSeconds": 86400,
            "feeTier": 3000,
            "maxSlippageBps": 100
        }))
        .unwrap();
        assert_eq!(cfg.amount_per_execution, U256::from(100_000_000u64));

        let hex: RecurringPaymentConfig = serde_json::from_value(json!({
            "recipient": "0x000000000000000000000000000000000000dEaD",
            "amount": "0x64",
            "intervalSeconds": 60
        }))
        .unwrap();
        assert_eq!(hex.amount, U256::from(100u64));
        assert!(hex.token.is_none());
    }

    #[test]
    fn failed_result_falls_back_to_last_confirmed_step() {
        let steps = vec![StepRecord {
            step: SagaStep::RedeemTransfer,
            tx_hash: B256::repeat_byte(1),
            status: StepStatus::Confirmed,
        }];
        let result = ExecutionResult::failed(&ExecutorError::Rpc("nonce too low".into()), steps);
        assert!(!result.success);
        assert_eq!(result.tx_hash, Some(B256::repeat_byte(1)));
        assert!(result.amount_in.is_none() && result.amount_out.is_none());
        assert_eq!(result.failure, Some(FailureKind::Rpc));
    }

    #[test]
    fn skipped_outcome_is_not_a_failure_payload() {
        let outcome = StrategyOutcome::Skipped(PriceCheckResult {
            current_price: Some(Decimal::new(2500, 0)),
            target_price: Decimal::new(3000, 0),
            should_execute: false,
            reason: PriceCheckReason::Waiting,
        });
        let payload = outcome.to_result();
        assert!(payload.success);
        assert!(payload.tx_hash.is_none());
        assert!(payload.error.unwrap().contains("target 3000"));
    }
}
