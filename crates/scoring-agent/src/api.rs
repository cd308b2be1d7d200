use crate::status::AgentStatus;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Status routes. Nothing here depends on the consumer being alive.
pub fn create_status_api(status: Arc<AgentStatus>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(agent_status))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .with_state(status)
}

/// Serve the status routes on `listener` until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    status: Arc<AgentStatus>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, create_status_api(status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    agent_id: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct MetricsResponse {
    responses_scored: u64,
    rewards_sent: u64,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Reports "running" for as long as the process is up, even when the
/// consumer has stopped.
async fn agent_status(State(status): State<Arc<AgentStatus>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        agent_id: status.agent_id().to_string(),
        status: "running",
    })
}

async fn metrics(State(status): State<Arc<AgentStatus>>) -> Json<MetricsResponse> {
    let metrics = status.metrics();
    Json(MetricsResponse {
        responses_scored: metrics.responses_scored.get(),
        rewards_sent: metrics.rewards_sent.get(),
    })
}

async fn prometheus_metrics(State(status): State<Arc<AgentStatus>>) -> Result<Response, ApiError> {
    let text = status
        .metrics()
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    )
        .into_response())
}

#[derive(Debug)]
enum ApiError {
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
