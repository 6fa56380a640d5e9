use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use serde::Serialize;
use tracing::info;

use crate::agent::{RunSummary, SchedulerState};
use crate::server::AppState;

/// Response for scheduler status endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatusResponse {
    pub state: SchedulerState,
    pub last_run: Option<RunSummary>,
}

/// Run every due agent now. Returns at once with `alreadyRunning: true` if a
/// run is in flight.
pub async fn run_due_agents(State(state): State<AppState>) -> ResponseJson<RunSummary> {
    info!("Manual scheduler run requested");
    ResponseJson(state.scheduler.run_once().await)
}

pub async fn get_status(State(state): State<AppState>) -> ResponseJson<SchedulerStatusResponse> {
    ResponseJson(SchedulerStatusResponse {
        state: state.scheduler.state(),
        last_run: state.scheduler.last_run().await,
    })
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/scheduler/run", post(run_due_agents))
        .route("/api/v1/scheduler/status", get(get_status))
}
