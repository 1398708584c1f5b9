use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::engine::calendar::{FillMode, WeekStart};
use crate::engine::derive::AssignmentFilter;
use crate::engine::session::SessionStatus;
use crate::engine::store::{DayView, MonthView, PlanningSnapshot, ViewSelection};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/planning/load", post(load_planning))
        .route("/planning/refresh", post(refresh_planning))
        .route("/planning/status", get(planning_status))
        .route("/planning/day", get(day_view))
        .route("/planning/month", get(month_view))
}

#[derive(Deserialize)]
pub struct DayQuery {
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub filter: AssignmentFilter,
}

#[derive(Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
    #[serde(default)]
    pub week_start: WeekStart,
    #[serde(default)]
    pub fill: FillMode,
}

async fn load_planning(
    State(state): State<Arc<AppState>>,
    Json(selection): Json<ViewSelection>,
) -> Result<Json<PlanningSnapshot>, AppError> {
    let snapshot = state.session.store.load(selection).await?;
    Ok(Json(PlanningSnapshot::clone(&snapshot)))
}

async fn refresh_planning(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlanningSnapshot>, AppError> {
    let snapshot = state.session.store.refresh().await?;
    Ok(Json(PlanningSnapshot::clone(&snapshot)))
}

async fn planning_status(State(state): State<Arc<AppState>>) -> Json<SessionStatus> {
    Json(state.session.status())
}

async fn day_view(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DayQuery>,
) -> Result<Json<DayView>, AppError> {
    let date = query
        .date
        .or_else(|| {
            state
                .session
                .store
                .selection()
                .and_then(|selection| selection.selected_date())
        })
        .ok_or_else(|| AppError::BadRequest("date is required".to_string()))?;

    let view = state.session.store.day_view(date, query.filter)?;
    Ok(Json(DayView::clone(&view)))
}

async fn month_view(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<MonthView>, AppError> {
    let (year, month) = match (query.year, query.month, state.session.store.selection()) {
        (Some(year), Some(month), _) => (year, month),
        (None, None, Some(ViewSelection::Month { year, month })) => (year, month),
        _ => {
            return Err(AppError::BadRequest(
                "year and month are required".to_string(),
            ))
        }
    };

    let view = state
        .session
        .store
        .month_view(year, month, query.week_start, query.fill)?;
    Ok(Json(view))
}
