//! Error taxonomy for the execution engine.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SagaStep;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    #[error("invalid agent configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: String, required: String },

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("timed out after {0}s waiting on {1}")]
    Timeout(u64, &'static str),

    #[error("quote failed: {0}")]
    Quote(String),

    #[error("{step} transaction reverted: {tx_hash}")]
    Reverted { step: SagaStep, tx_hash: B256 },

    #[error("abi error: {0}")]
    Abi(#[from] alloy::sol_types::Error),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the reporter to decide the agent's fate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Configuration,
    Revert,
    Rpc,
    Quote,
    InsufficientBalance,
}

impl FailureKind {
    /// Configuration failures stop the agent outright instead of waiting for
    /// the consecutive-failure threshold.
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::Configuration)
    }
}

impl ExecutorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutorError::Configuration(_)
            | ExecutorError::UnknownAgentType(_)
            | ExecutorError::InvalidConfig(_) => FailureKind::Configuration,
            ExecutorError::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            ExecutorError::Reverted { .. } => FailureKind::Revert,
            ExecutorError::Quote(_) => FailureKind::Quote,
            ExecutorError::Rpc(_)
            | ExecutorError::Timeout(..)
            | ExecutorError::Abi(_)
            | ExecutorError::Store(_)
            | ExecutorError::Internal(_) => FailureKind::Rpc,
        }
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            ExecutorError::Reverted { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}
