//! Trigger surface driven through the axum router without a socket.

use std::sync::Arc;
use std::time::Duration;

use agent_executor::agent::{AgentRouter, ExecutionContext, Scheduler};
use agent_executor::auth::TriggerKey;
use agent_executor::config::GasLimits;
use agent_executor::database::MemoryAgentStore;
use agent_executor::server::{AppState, build_router};
use agent_executor::test_support::{self, MockChain, QUOTER, SWAP_ROUTER, USDC, USER};
use alloy::primitives::U256;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

fn app(store: Arc<MemoryAgentStore>, key: Option<&str>) -> Router {
    let chain = Arc::new(MockChain::new().with_balance(USDC, USER, U256::from(100_000_000u64)));
    let router = AgentRouter::with_defaults(
        ExecutionContext {
            chain,
            gas: GasLimits::default(),
        },
        QUOTER,
        SWAP_ROUTER,
    );
    let scheduler = Arc::new(Scheduler::new(store.clone(), router, Duration::ZERO));
    build_router(AppState { scheduler, store }, TriggerKey::new(key.map(str::to_string)))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn ping_is_open() {
    let response = app(Arc::new(MemoryAgentStore::new()), Some("k"))
        .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "pong" }));
}

#[tokio::test]
async fn trigger_routes_require_the_key() {
    let app = app(Arc::new(MemoryAgentStore::new()), Some("trigger-key"));

    let denied = app
        .clone()
        .oneshot(Request::post("/api/v1/scheduler/run").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::post("/api/v1/scheduler/run")
                .header(header::AUTHORIZATION, "Bearer trigger-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    let body = json_body(allowed).await;
    assert_eq!(body["success"], 0);
    assert_eq!(body["alreadyRunning"], false);
}

#[tokio::test]
async fn manual_execution_returns_result_payload() {
    let agent = test_support::payment_agent(Some(USDC));
    let store = Arc::new(MemoryAgentStore::with_agents([agent.clone()]));

    let response = app(store.clone(), None)
        .oneshot(
            Request::post(format!("/api/v1/agents/{}/execute", agent.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "agentType": "recurring-payment" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["amountIn"], "10000000");
    assert_eq!(store.get(agent.id).await.unwrap().execution_count, 1);
}

#[tokio::test]
async fn unknown_agent_is_a_failed_payload_not_an_error() {
    let response = app(Arc::new(MemoryAgentStore::new()), None)
        .oneshot(
            Request::post(format!("/api/v1/agents/{}/execute", uuid::Uuid::new_v4()))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"agentType":"dca"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn status_reports_idle_and_last_run() {
    let app = app(Arc::new(MemoryAgentStore::new()), None);
    app.clone()
        .oneshot(Request::post("/api/v1/scheduler/run").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let response = app
        .oneshot(Request::get("/api/v1/scheduler/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "idle");
    assert!(body["lastRun"].is_object());
}

#[tokio::test]
async fn malformed_manual_requests_still_return_a_result() {
    let agent = test_support::payment_agent(Some(USDC));
    let store = Arc::new(MemoryAgentStore::with_agents([agent.clone()]));
    let app = app(store.clone(), None);

    let missing_type = app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/agents/{}/execute", agent.id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing_type.status(), StatusCode::OK);
    let body = json_body(missing_type).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invalid request body"));

    let bad_id = app
        .oneshot(
            Request::post("/api/v1/agents/not-a-uuid/execute")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"agentType":"recurring-payment"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad_id.status(), StatusCode::OK);
    let body = json_body(bad_id).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invalid agent id"));

    let stored = store.get(agent.id).await.unwrap();
    assert_eq!(stored.execution_count, 0);
    assert!(stored.execution_logs.is_empty());
}
