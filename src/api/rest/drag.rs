use std::sync::Arc;

use axum::routing::post;
use axum::extract::State;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::rest::outcome_body;
use crate::engine::drag_drop::{DragKind, DragPayload, DragStatus};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/planning/drag/start", post(drag_start))
        .route("/planning/drag/over", post(drag_over))
        .route("/planning/drag/leave", post(drag_leave))
        .route("/planning/drag/end", post(drag_end))
        .route("/planning/drop", post(drop_on))
}

#[derive(Deserialize)]
pub struct DragStartRequest {
    pub kind: DragKind,
    pub id: String,
}

#[derive(Deserialize)]
pub struct DragTargetRequest {
    pub target: String,
    #[serde(default)]
    pub pointer_within: bool,
}

#[derive(Deserialize)]
pub struct DropRequest {
    pub technician_id: String,
}

#[derive(Serialize)]
pub struct DragResponse {
    pub changed: bool,
    #[serde(flatten)]
    pub status: DragStatus,
}

async fn drag_start(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DragStartRequest>,
) -> Result<Json<DragStatus>, AppError> {
    let snapshot = state.session.store.snapshot();
    let dragged = match payload.kind {
        DragKind::Task => snapshot.task(&payload.id).cloned().map(DragPayload::Task),
        DragKind::Reservation => snapshot
            .reservation(&payload.id)
            .cloned()
            .map(DragPayload::Reservation),
    }
    .ok_or_else(|| AppError::NotFound(format!("nothing to drag with id {}", payload.id)))?;

    state.session.drag.drag_start(dragged)?;
    Ok(Json(state.session.drag.status()))
}

async fn drag_over(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DragTargetRequest>,
) -> Json<DragResponse> {
    let changed = state.session.drag.drag_over(&payload.target);
    Json(DragResponse {
        changed,
        status: state.session.drag.status(),
    })
}

async fn drag_leave(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DragTargetRequest>,
) -> Json<DragResponse> {
    let changed = state
        .session
        .drag
        .drag_leave(&payload.target, payload.pointer_within);
    Json(DragResponse {
        changed,
        status: state.session.drag.status(),
    })
}

async fn drag_end(State(state): State<Arc<AppState>>) -> Json<DragStatus> {
    state.session.drag.drag_end();
    Json(state.session.drag.status())
}

async fn drop_on(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DropRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.session.drag.drop_on(&payload.technician_id).await;
    outcome_body(outcome)
}
