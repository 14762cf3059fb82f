//! Failover agent HTTP routes
//!
//! | Method | Path         | Body            |
//! |--------|--------------|-----------------|
//! | GET    | `/health`    |                 |
//! | POST   | `/pause`     | `PauseRequest`  |
//! | POST   | `/resume`    |                 |
//! | POST   | `/migrate`   |                 |
//! | POST   | `/unmigrate` |                 |
//!
//! Failures answer with the agent error as the JSON body.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::failover::{
    AgentError, AgentErrorCode, FailoverAgent, HealthCheckResponse, MigrateResponse,
    PauseRequest, PauseResponse, ResumeResponse, UnmigrateResponse,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<AgentError>)>;

/// Create agent routes
pub fn agent_routes(agent: Arc<FailoverAgent>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/pause", post(pause_handler))
        .route("/resume", post(resume_handler))
        .route("/migrate", post(migrate_handler))
        .route("/unmigrate", post(unmigrate_handler))
        .with_state(agent)
}

/// HTTP status for each agent error code
pub fn status_for(code: AgentErrorCode) -> StatusCode {
    match code {
        AgentErrorCode::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        AgentErrorCode::NotFound => StatusCode::NOT_FOUND,
        AgentErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        AgentErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T>(result: Result<T, AgentError>) -> ApiResult<T> {
    result
        .map(Json)
        .map_err(|err| (status_for(err.code), Json(err)))
}

async fn health_handler(State(agent): State<Arc<FailoverAgent>>) -> ApiResult<HealthCheckResponse> {
    respond(agent.health_check().await)
}

async fn pause_handler(
    State(agent): State<Arc<FailoverAgent>>,
    Json(request): Json<PauseRequest>,
) -> ApiResult<PauseResponse> {
    respond(agent.pause(request).await)
}

async fn resume_handler(State(agent): State<Arc<FailoverAgent>>) -> ApiResult<ResumeResponse> {
    respond(agent.resume().await)
}

async fn migrate_handler(State(agent): State<Arc<FailoverAgent>>) -> ApiResult<MigrateResponse> {
    respond(agent.migrate().await)
}

async fn unmigrate_handler(State(agent): State<Arc<FailoverAgent>>) -> ApiResult<UnmigrateResponse> {
    respond(agent.unmigrate().await)
}
