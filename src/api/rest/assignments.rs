use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::api::rest::outcome_body;
use crate::engine::coordinator::ScheduleDate;
use crate::error::AppError;
use crate::models::task::{DeliveryTask, TaskStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/planning/reservations/:id/assign",
            post(assign_reservation),
        )
        .route("/planning/tasks/:id/reassign", post(reassign_task))
        .route("/planning/tasks/:id/unassign", post(unassign_task))
        .route("/planning/tasks/:id/status", patch(update_task_status))
        .route("/technicians/:id/tasks", get(technician_tasks))
}

#[derive(Deserialize)]
pub struct AssignReservationRequest {
    #[serde(default)]
    pub technician_id: String,
    pub vehicle_id: Option<String>,
    pub scheduled_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    #[serde(default)]
    pub technician_id: String,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TaskStatus,
}

async fn assign_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AssignReservationRequest>,
) -> Result<Json<Value>, AppError> {
    let session = &state.session;
    let reservation = session
        .store
        .snapshot()
        .reservation(&id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("reservation {id} is not pending")))?;

    let vehicle_id = payload
        .vehicle_id
        .filter(|vehicle_id| !vehicle_id.trim().is_empty())
        .or_else(|| session.coordinator.vehicle_for(&payload.technician_id));
    let schedule = payload
        .scheduled_date
        .map(ScheduleDate::Selected)
        .unwrap_or(ScheduleDate::ReservationStart);

    let outcome = session
        .coordinator
        .assign_reservation(
            &reservation,
            &payload.technician_id,
            vehicle_id.as_deref(),
            schedule,
        )
        .await;
    outcome_body(outcome)
}

async fn reassign_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<Value>, AppError> {
    let task = state
        .session
        .store
        .snapshot()
        .task(&id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("task {id} not found")))?;

    let outcome = state
        .session
        .coordinator
        .reassign_task(&task, &payload.technician_id)
        .await;
    outcome_body(outcome)
}

async fn unassign_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.session.coordinator.unassign_task(&id).await;
    outcome_body(outcome)
}

async fn update_task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state
        .session
        .coordinator
        .update_status(&id, payload.status)
        .await;
    outcome_body(outcome)
}

async fn technician_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryTask>>, AppError> {
    let tasks = state.session.coordinator.technician_tasks(&id).await?;
    Ok(Json(tasks))
}
