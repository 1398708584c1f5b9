use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::backend::PlanningBackend;
use crate::engine::calendar::{
    build_calendar_days, first_of_month, last_of_month, weekday_labels, CalendarDay, FillMode,
    WeekStart,
};
use crate::engine::derive::{
    filter_by_assignment, group_all_tasks_by_date, group_by_technician, tasks_for_date,
    unassigned_reservations_for_date, AssignmentFilter,
};
use crate::engine::notifier::Notifier;
use crate::engine::with_timeout;
use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::DeliveryTask;
use crate::models::technician::Technician;
use crate::models::vehicle::Vehicle;
use crate::observability::metrics::Metrics;

/// What the planning view is looking at: one day, or a whole month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewSelection {
    Day { date: NaiveDate },
    Month { year: i32, month: u32 },
}

impl ViewSelection {
    pub fn date_range(self) -> Result<(NaiveDate, NaiveDate), AppError> {
        match self {
            ViewSelection::Day { date } => Ok((date, date)),
            ViewSelection::Month { year, month } => {
                Ok((first_of_month(year, month)?, last_of_month(year, month)?))
            }
        }
    }

    pub fn selected_date(self) -> Option<NaiveDate> {
        match self {
            ViewSelection::Day { date } => Some(date),
            ViewSelection::Month { .. } => None,
        }
    }

    fn kind(self) -> &'static str {
        match self {
            ViewSelection::Day { .. } => "day",
            ViewSelection::Month { .. } => "month",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanningSnapshot {
    pub generation: u64,
    pub selection: Option<ViewSelection>,
    pub vehicles: Vec<Vehicle>,
    pub technicians: Vec<Technician>,
    pub tasks: Vec<DeliveryTask>,
    pub unassigned_reservations: Vec<UnassignedReservation>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl PlanningSnapshot {
    pub fn technician(&self, technician_id: &str) -> Option<&Technician> {
        self.technicians
            .iter()
            .find(|technician| technician.id == technician_id)
    }

    pub fn task(&self, task_id: &str) -> Option<&DeliveryTask> {
        self.tasks.iter().find(|task| task.id == task_id)
    }

    pub fn reservation(&self, reservation_id: &str) -> Option<&UnassignedReservation> {
        self.unassigned_reservations
            .iter()
            .find(|reservation| reservation.id == reservation_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub filter: AssignmentFilter,
    pub tasks: Vec<DeliveryTask>,
    pub tasks_by_technician: BTreeMap<String, Vec<DeliveryTask>>,
    pub unassigned_tasks: Vec<DeliveryTask>,
    pub unassigned_reservations: Vec<UnassignedReservation>,
    pub technicians: Vec<Technician>,
    pub vehicles: Vec<Vehicle>,
}

impl DayView {
    pub fn derive(snapshot: &PlanningSnapshot, date: NaiveDate, filter: AssignmentFilter) -> Self {
        let existing = tasks_for_date(&snapshot.tasks, date);
        let filtered = filter_by_assignment(&existing, filter);

        Self {
            date,
            filter,
            tasks_by_technician: group_by_technician(&filtered),
            unassigned_tasks: filter_by_assignment(&existing, AssignmentFilter::Unassigned),
            unassigned_reservations: unassigned_reservations_for_date(
                &snapshot.unassigned_reservations,
                date,
                &existing,
            ),
            tasks: filtered,
            technicians: snapshot.technicians.clone(),
            vehicles: snapshot.vehicles.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub week_start: WeekStart,
    pub fill: FillMode,
    pub weekdays: Vec<String>,
    pub days: Vec<CalendarDay>,
}

type DayViewKey = (u64, NaiveDate, AssignmentFilter);

/// Holds the last good planning snapshot and refills it from the backend.
pub struct TaskStore {
    backend: Arc<dyn PlanningBackend>,
    notifier: Notifier,
    metrics: Metrics,
    timeout: Duration,
    snapshot: RwLock<Arc<PlanningSnapshot>>,
    generation: AtomicU64,
    load_seq: AtomicU64,
    loading: AtomicUsize,
    last_error: RwLock<Option<String>>,
    day_view_cache: Mutex<Option<(DayViewKey, Arc<DayView>)>>,
}

/// Counts in-flight loads so overlapping loads keep the flag raised.
struct LoadingFlag<'a>(&'a AtomicUsize);

impl<'a> LoadingFlag<'a> {
    fn raise(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl TaskStore {
    pub fn new(
        backend: Arc<dyn PlanningBackend>,
        notifier: Notifier,
        metrics: Metrics,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            notifier,
            metrics,
            timeout,
            snapshot: RwLock::new(Arc::new(PlanningSnapshot::default())),
            generation: AtomicU64::new(0),
            load_seq: AtomicU64::new(0),
            loading: AtomicUsize::new(0),
            last_error: RwLock::new(None),
            day_view_cache: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> Arc<PlanningSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn selection(&self) -> Option<ViewSelection> {
        self.snapshot().selection
    }

    /// Full fetch for a new day or month. On failure the previous snapshot
    /// stays in place. Only the most recently started load may commit.
    pub async fn load(&self, selection: ViewSelection) -> Result<Arc<PlanningSnapshot>, AppError> {
        let _loading = LoadingFlag::raise(&self.loading);
        let ticket = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let (from, to) = selection.date_range()?;

        let fetched = tokio::try_join!(
            with_timeout(self.timeout, self.backend.get_all_vehicles()),
            with_timeout(self.timeout, self.backend.get_all_technicians()),
            with_timeout(self.timeout, self.fetch_tasks(from, to)),
            with_timeout(self.timeout, self.backend.get_unassigned_reservations()),
        );

        match fetched {
            Ok((vehicles, technicians, tasks, unassigned_reservations)) => {
                let snapshot = PlanningSnapshot {
                    generation: self.next_generation(),
                    selection: Some(selection),
                    vehicles,
                    technicians,
                    tasks,
                    unassigned_reservations,
                    loaded_at: Some(Utc::now()),
                };
                self.record_success(selection.kind(), "load");
                info!(
                    selection = ?selection,
                    tasks = snapshot.tasks.len(),
                    reservations = snapshot.unassigned_reservations.len(),
                    "planning loaded"
                );
                Ok(self.replace(snapshot, ticket))
            }
            Err(err) if self.is_superseded(ticket) => {
                warn!(selection = ?selection, error = %err, "superseded load failed");
                Err(err)
            }
            Err(err) => {
                self.record_failure(selection.kind(), "load", &err);
                self.notifier
                    .error("Loading failed", format!("Could not load the planning: {err}"));
                Err(err)
            }
        }
    }

    /// Re-fetches tasks and unassigned reservations for the current selection;
    /// vehicles and technicians are kept.
    pub async fn refresh(&self) -> Result<Arc<PlanningSnapshot>, AppError> {
        let current = self.snapshot();
        let Some(selection) = current.selection else {
            return Ok(current);
        };
        let (from, to) = selection.date_range()?;

        let fetched = tokio::try_join!(
            with_timeout(self.timeout, self.fetch_tasks(from, to)),
            with_timeout(self.timeout, self.backend.get_unassigned_reservations()),
        );

        match fetched {
            Ok((tasks, unassigned_reservations)) => {
                self.record_success(selection.kind(), "refresh");
                let mut guard = self
                    .snapshot
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());

                // A load for another selection finished in the meantime.
                if guard.selection != Some(selection) {
                    warn!(selection = ?selection, "discarding stale refresh");
                    return Ok(guard.clone());
                }

                let refreshed = PlanningSnapshot {
                    generation: self.next_generation(),
                    selection: Some(selection),
                    vehicles: guard.vehicles.clone(),
                    technicians: guard.technicians.clone(),
                    tasks,
                    unassigned_reservations,
                    loaded_at: Some(Utc::now()),
                };
                self.metrics.snapshot_tasks.set(refreshed.tasks.len() as i64);
                *guard = Arc::new(refreshed);
                Ok(guard.clone())
            }
            Err(err) => {
                self.record_failure(selection.kind(), "refresh", &err);
                self.notifier
                    .error("Refresh failed", format!("Could not refresh the planning: {err}"));
                Err(err)
            }
        }
    }

    /// Derived day view, memoised on snapshot generation, date and filter.
    /// The date must lie inside the loaded selection.
    pub fn day_view(
        &self,
        date: NaiveDate,
        filter: AssignmentFilter,
    ) -> Result<Arc<DayView>, AppError> {
        let snapshot = self.snapshot();
        ensure_covered(&snapshot, date, date)?;
        let key = (snapshot.generation, date, filter);

        let mut cache = self
            .day_view_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((cached_key, view)) = cache.as_ref() {
            if *cached_key == key {
                return Ok(view.clone());
            }
        }

        let view = Arc::new(DayView::derive(&snapshot, date, filter));
        *cache = Some((key, view.clone()));
        Ok(view)
    }

    pub fn month_view(
        &self,
        year: i32,
        month: u32,
        week_start: WeekStart,
        fill: FillMode,
    ) -> Result<MonthView, AppError> {
        let snapshot = self.snapshot();
        ensure_covered(
            &snapshot,
            first_of_month(year, month)?,
            last_of_month(year, month)?,
        )?;
        let tasks_by_date = group_all_tasks_by_date(&snapshot.tasks);
        let days = build_calendar_days(year, month, week_start, fill, &tasks_by_date)?;

        Ok(MonthView {
            year,
            month,
            week_start,
            fill,
            weekdays: weekday_labels(week_start)
                .iter()
                .map(|weekday| weekday.to_string())
                .collect(),
            days,
        })
    }

    async fn fetch_tasks(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryTask>, AppError> {
        if from == to {
            self.backend.get_tasks_by_date(from).await
        } else {
            self.backend.get_tasks_between(from, to).await
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.load_seq.load(Ordering::SeqCst) != ticket
    }

    fn replace(&self, snapshot: PlanningSnapshot, ticket: u64) -> Arc<PlanningSnapshot> {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // A newer load started while this one was in flight.
        if self.is_superseded(ticket) {
            warn!(selection = ?snapshot.selection, "discarding superseded load");
            return guard.clone();
        }

        let snapshot = Arc::new(snapshot);
        self.metrics.snapshot_tasks.set(snapshot.tasks.len() as i64);
        *guard = snapshot.clone();
        drop(guard);
        *self
            .last_error
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        snapshot
    }

    fn record_success(&self, kind: &str, stage: &str) {
        self.metrics
            .loads_total
            .with_label_values(&[&format!("{kind}_{stage}"), "success"])
            .inc();
    }

    fn record_failure(&self, kind: &str, stage: &str, err: &AppError) {
        self.metrics
            .loads_total
            .with_label_values(&[&format!("{kind}_{stage}"), "error"])
            .inc();
        error!(error = %err, kind, stage, "planning fetch failed");
        if stage == "load" {
            *self
                .last_error
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err.to_string());
        }
    }
}

/// Views are only derived for dates whose tasks were fetched; reservations
/// cover every date, so anything else would list them next to hidden tasks.
fn ensure_covered(
    snapshot: &PlanningSnapshot,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<(), AppError> {
    let selection = snapshot
        .selection
        .ok_or_else(|| AppError::BadRequest("no planning loaded".to_string()))?;
    let (loaded_from, loaded_to) = selection.date_range()?;

    if from < loaded_from || to > loaded_to {
        return Err(AppError::BadRequest(format!(
            "{from}..{to} is outside the loaded planning {loaded_from}..{loaded_to}"
        )));
    }
    Ok(())
}
