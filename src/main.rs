//! # Agent Executor
//!
//! Executes delegated on-chain agents (DCA buys, limit orders, auto-savings
//! deposits and recurring payments) when they fall due, spending through a
//! previously granted delegation instead of a live user signature.
//!
//! ## Environment Setup
//! Configure the process through environment variables or a `.env` file:
//! ```bash
//! RPC_URL=https://sepolia.base.org
//! SESSION_PRIVATE_KEY=0x...
//! DATABASE_URL=postgres://executor@localhost/agents   # or `memory`
//! ```
//!
//! ## Health Check
//! ```bash
//! curl http://localhost:3000/ping
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use agent_executor::server;

/// Application entry point.
///
/// Initializes logging, then runs the server until the process is terminated.
/// Startup errors (bad configuration, missing session key, unreachable
/// database) end the process with a non-zero exit code.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false) // Don't show module targets for cleaner output
                .compact(),
        )
        .init();

    tracing::info!("🏁 Starting agent executor...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("🏗️  Build profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });

    if let Err(e) = server::start().await {
        tracing::error!("❌ Agent executor stopped: {:#}", e);
        return Err(e);
    }
    Ok(())
}
