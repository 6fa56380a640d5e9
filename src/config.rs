//! Configuration module for environment variables and application settings

use std::env;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result, anyhow};

#[derive(Debug, Clone)]
pub struct Config {
    /// Chain and session-key configuration
    pub chain: ChainConfig,

    /// Protocol contract addresses
    pub contracts: ContractAddresses,

    /// Gas ceilings per call type
    pub gas: GasLimits,

    /// Scheduler cadence
    pub scheduler: SchedulerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Server configuration
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Executor's own signing key. Optional here so a misconfigured process
    /// can still report why it cannot execute.
    pub session_private_key: Option<String>,
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub swap_router: Address,
    pub quoter: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasLimits {
    pub redeem: u64,
    pub approve: u64,
    pub swap: u64,
    pub supply: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            redeem: 500_000,
            approve: 100_000,
            swap: 300_000,
            supply: 300_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Pause between agents to stay under upstream RPC rate limits.
    pub agent_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            agent_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `memory` selects the in-process store.
    pub url: String,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == "memory"
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on trigger routes when set.
    pub trigger_api_key: Option<String>,
}

// Uniswap V3 deployments on Base Sepolia
const DEFAULT_SWAP_ROUTER: &str = "0x94cC0AaC535CCDB3C01d6787D6413C739ae12bc4";
const DEFAULT_QUOTER: &str = "0xC5290058841028F1614F3A6F0F5816cAd0df5E27";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            chain: ChainConfig {
                rpc_url: env::var("RPC_URL")
                    .map_err(|_| anyhow!("RPC_URL environment variable is required"))?,
                chain_id: parse_or("CHAIN_ID", 84532)?,
                session_private_key: env::var("SESSION_PRIVATE_KEY").ok().filter(|k| !k.is_empty()),
                rpc_timeout: Duration::from_secs(parse_or("RPC_TIMEOUT_SECS", 30)?),
                receipt_timeout: Duration::from_secs(parse_or("RECEIPT_TIMEOUT_SECS", 120)?),
                receipt_poll_interval: Duration::from_millis(parse_or("RECEIPT_POLL_INTERVAL_MS", 2000)?),
            },

            contracts: ContractAddresses {
                swap_router: address_or("SWAP_ROUTER_ADDRESS", DEFAULT_SWAP_ROUTER)?,
                quoter: address_or("QUOTER_ADDRESS", DEFAULT_QUOTER)?,
            },

            gas: {
                let defaults = GasLimits::default();
                GasLimits {
                    redeem: parse_or("GAS_LIMIT_REDEEM", defaults.redeem)?,
                    approve: parse_or("GAS_LIMIT_APPROVE", defaults.approve)?,
                    swap: parse_or("GAS_LIMIT_SWAP", defaults.swap)?,
                    supply: parse_or("GAS_LIMIT_SUPPLY", defaults.supply)?,
                }
            },

            scheduler: SchedulerConfig {
                enabled: parse_or("SCHEDULER_ENABLED", true)?,
                interval: Duration::from_secs(parse_or("SCHEDULER_INTERVAL_SECS", 60)?),
                agent_delay: Duration::from_millis(parse_or("SCHEDULER_AGENT_DELAY_MS", 1000)?),
            },

            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .map_err(|_| anyhow!("DATABASE_URL environment variable is required"))?,
            },

            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_or("PORT", 3000)?,
                trigger_api_key: env::var("TRIGGER_API_KEY").ok().filter(|k| !k.is_empty()),
            },
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

fn address_or(key: &str, default: &str) -> Result<Address> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Address::from_str(raw.trim()).with_context(|| format!("{} is not a valid address", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_router_addresses_parse() {
        assert!(Address::from_str(DEFAULT_SWAP_ROUTER).is_ok());
        assert!(Address::from_str(DEFAULT_QUOTER).is_ok());
    }

    #[test]
    fn parse_or_falls_back_when_unset() {
        let value: u64 = parse_or("AGENT_EXECUTOR_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn memory_database_url_selects_memory_store() {
        assert!(DatabaseConfig { url: "memory".into() }.is_memory());
        assert!(!DatabaseConfig { url: "postgres://localhost/agents".into() }.is_memory());
    }
}
