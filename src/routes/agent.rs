use axum::{
    Router,
    extract::{
        Json, Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    response::Json as ResponseJson,
    routing::post,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ExecutorError;
use crate::models::ExecutionResult;
use crate::server::AppState;

/// Request to execute a single agent now
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteAgentRequest {
    pub agent_type: String,
}

/// Execute one agent immediately, outside its schedule.
///
/// The outcome is recorded exactly as a scheduled attempt would be. Failures
/// come back in the payload (`success: false`), never as an error status,
/// and that includes a malformed id or body.
pub async fn execute_agent(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<ExecuteAgentRequest>, JsonRejection>,
) -> ResponseJson<ExecutionResult> {
    let id = match id {
        Ok(Path(id)) => id,
        Err(rejection) => return malformed(format!("invalid agent id: {}", rejection.body_text())),
    };
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => return malformed(format!("invalid request body: {}", rejection.body_text())),
    };

    info!("Manual execution requested for agent {} ({})", id, request.agent_type);
    ResponseJson(state.scheduler.execute_agent(id, &request.agent_type).await)
}

fn malformed(message: String) -> ResponseJson<ExecutionResult> {
    warn!("Manual execution rejected: {}", message);
    ResponseJson(ExecutionResult::failed(&ExecutorError::Configuration(message), Vec::new()))
}

pub fn create_routes() -> Router<AppState> {
    Router::new().route("/api/v1/agents/{id}/execute", post(execute_agent))
}
