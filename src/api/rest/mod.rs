pub mod assignments;
pub mod drag;
pub mod planning;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::engine::coordinator::OperationOutcome;
use crate::error::AppError;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(planning::router())
        .merge(assignments::router())
        .merge(drag::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"))
}

/// Maps a coordinator outcome to the JSON body handlers return.
pub(crate) fn outcome_body(outcome: OperationOutcome) -> Result<Json<Value>, AppError> {
    match outcome.into_result()? {
        Some(task) => Ok(Json(json!({ "outcome": "applied", "task": task }))),
        None => Ok(Json(json!({ "outcome": "unchanged" }))),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    loading: bool,
    tasks: usize,
    unassigned_reservations: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let snapshot = state.session.store.snapshot();
    Json(HealthResponse {
        status: "ok",
        loading: state.session.store.is_loading(),
        tasks: snapshot.tasks.len(),
        unassigned_reservations: snapshot.unassigned_reservations.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
