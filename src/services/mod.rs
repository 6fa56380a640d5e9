//! # Services Module
//!
//! On-chain building blocks shared by the execution strategies: delegation
//! redemption and quoter-backed pricing.

pub mod delegation;
pub mod price_oracle;

pub use delegation::{Execution, redeem_request};
pub use price_oracle::PriceOracle;
