//! Dispatcher HTTP surface: the commit inlet and the runner registration
//! endpoints.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{AdmissionError, RegistryError};
use crate::intake::Intake;
use crate::registry::RunnerRegistry;
use crate::repository::CommitEvent;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<Intake>,
    pub registry: Arc<RunnerRegistry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub addr: String,
}

#[derive(Debug, Serialize)]
struct RunnerInfo {
    addr: String,
    alive: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_body(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/commit", post(submit_commit))
        .route(
            "/runner",
            post(register_runner).get(list_runners).delete(remove_runner),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Dispatcher listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn submit_commit(State(state): State<AppState>, Json(event): Json<CommitEvent>) -> Response {
    match state.intake.admit(event) {
        Ok(job) => (
            StatusCode::OK,
            Json(serde_json::json!({ "commit": job.commit.id })),
        )
            .into_response(),
        Err(e @ AdmissionError::AlreadyProcessed) => error_body(StatusCode::CONFLICT, e),
        Err(e @ AdmissionError::Backpressure) => error_body(StatusCode::SERVICE_UNAVAILABLE, e),
        Err(e @ AdmissionError::MalformedEvent(_)) => error_body(StatusCode::BAD_REQUEST, e),
    }
}

async fn register_runner(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    match state.registry.register(&request.addr).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e @ RegistryError::AlreadyRegistered(_)) => error_body(StatusCode::CONFLICT, e),
        Err(e @ RegistryError::Unreachable { .. }) => error_body(StatusCode::BAD_GATEWAY, e),
        Err(e) => error_body(StatusCode::BAD_REQUEST, e),
    }
}

async fn list_runners(State(state): State<AppState>) -> Response {
    let runners: Vec<RunnerInfo> = state
        .registry
        .snapshot()
        .iter()
        .map(|h| RunnerInfo {
            addr: h.addr().to_string(),
            alive: h.is_alive(),
        })
        .collect();
    Json(runners).into_response()
}

async fn remove_runner(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Response {
    if state.registry.remove(&request.addr) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_body(
            StatusCode::NOT_FOUND,
            RegistryError::NotFound(request.addr),
        )
    }
}
