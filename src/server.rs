//! # Server Module
//!
//! Wires the execution engine together and serves the trigger surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, http::{Method, header}, middleware, routing::get};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{AgentRouter, ExecutionContext, Scheduler};
use crate::auth::{AuthMiddleware, TriggerKey};
use crate::chain::{ChainClient, RpcChainClient};
use crate::config::Config;
use crate::database::{AgentStore, DatabaseConnection, MemoryAgentStore, PgAgentStore, migrations};
use crate::routes::{self, health::{health, ping}};

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn AgentStore>,
}

/// Build the agent store selected by `DATABASE_URL`.
pub async fn connect_store(config: &Config) -> Result<Arc<dyn AgentStore>> {
    if config.database.is_memory() {
        tracing::warn!("⚠️  Using in-memory agent store, nothing will persist");
        return Ok(Arc::new(MemoryAgentStore::new()));
    }

    let db = DatabaseConnection::from_url(&config.database.url).await?;
    migrations::run_migrations(db.pool()).await?;
    Ok(Arc::new(PgAgentStore::new(db)))
}

/// Assemble the router with trigger routes behind the bearer key.
pub fn build_router(state: AppState, trigger_key: TriggerKey) -> Router {
    let trigger_routes = Router::new()
        .merge(routes::agent::create_routes())
        .merge(routes::scheduler::create_routes())
        .layer(middleware::from_fn_with_state(trigger_key, AuthMiddleware::validate_trigger_key));

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health))
        .merge(trigger_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]),
            ),
        )
        .with_state(state)
}

/// Starts the agent executor.
///
/// Loads configuration, connects the session-key chain client and the agent
/// store, starts the background scheduler and serves HTTP until the process is
/// terminated. A missing session key stops startup.
pub async fn start() -> Result<()> {
    let config = Config::from_env()?;

    let chain = RpcChainClient::connect(&config.chain).context("Cannot execute agents without a session key")?;
    if let Err(e) = chain.verify_chain_id().await {
        tracing::warn!("⚠️  Chain check failed: {}", e);
    }
    let chain: Arc<dyn ChainClient> = Arc::new(chain);

    let store = connect_store(&config).await?;

    let router = AgentRouter::with_defaults(
        ExecutionContext {
            chain,
            gas: config.gas,
        },
        config.contracts.quoter,
        config.contracts.swap_router,
    );
    let scheduler = Arc::new(Scheduler::new(store.clone(), router, config.scheduler.agent_delay));

    if config.scheduler.enabled {
        scheduler.clone().spawn(config.scheduler.interval);
    } else {
        tracing::info!("⏸️  Background scheduler disabled, trigger routes only");
    }

    let app = build_router(
        AppState { scheduler, store },
        TriggerKey::new(config.server.trigger_api_key.clone()),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} - port may already be in use", addr))?;

    tracing::info!("🚀 Agent executor starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/ping", addr);
    tracing::info!("🤖 Trigger endpoints available at http://{}/api/v1/*", addr);
    if config.server.trigger_api_key.is_none() {
        tracing::warn!("⚠️  TRIGGER_API_KEY not set, trigger endpoints are open");
    }

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
