use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use prometheus::IntGauge;
use tracing::{debug, error, info};

use crate::backend::PlanningBackend;
use crate::engine::guard::{OperationGuard, OperationKey, OperationVerb};
use crate::engine::notifier::Notifier;
use crate::engine::store::TaskStore;
use crate::engine::with_timeout;
use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::{
    AddressSnapshot, CustomerSnapshot, DeliveryTask, NewDeliveryTask, TaskProduct, TaskStatus,
    TaskType,
};
use crate::observability::metrics::Metrics;

const DEFAULT_PRODUCT_NAME: &str = "Produit";

/// Which date a newly created task is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDate {
    /// Day view: the reservation's own start date.
    ReservationStart,
    /// Drag and drop: the date currently shown.
    Selected(NaiveDate),
}

#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Applied(DeliveryTask),
    /// Nothing to do, e.g. reassigning to the same technician.
    Unchanged,
    /// Another operation holds the guard.
    Busy(OperationKey),
    Failed(AppError),
}

impl OperationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, OperationOutcome::Applied(_))
    }

    pub fn into_result(self) -> Result<Option<DeliveryTask>, AppError> {
        match self {
            OperationOutcome::Applied(task) => Ok(Some(task)),
            OperationOutcome::Unchanged => Ok(None),
            OperationOutcome::Busy(key) => Err(AppError::OperationInProgress(key.to_string())),
            OperationOutcome::Failed(err) => Err(err),
        }
    }
}

pub struct AssignmentCoordinator {
    backend: Arc<dyn PlanningBackend>,
    store: Arc<TaskStore>,
    guard: OperationGuard,
    notifier: Notifier,
    metrics: Metrics,
    timeout: Duration,
    default_delivery_time: String,
}

impl AssignmentCoordinator {
    pub fn new(
        backend: Arc<dyn PlanningBackend>,
        store: Arc<TaskStore>,
        guard: OperationGuard,
        notifier: Notifier,
        metrics: Metrics,
        timeout: Duration,
        default_delivery_time: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            store,
            guard,
            notifier,
            metrics,
            timeout,
            default_delivery_time: default_delivery_time.into(),
        }
    }

    /// Vehicle currently linked to a technician in the loaded snapshot.
    pub fn vehicle_for(&self, technician_id: &str) -> Option<String> {
        self.store
            .snapshot()
            .technician(technician_id)
            .and_then(|technician| technician.vehicle_id.clone())
    }

    /// First assignment of a reservation. Updates its existing task, or
    /// creates one already carrying the technician and vehicle.
    pub async fn assign_reservation(
        &self,
        reservation: &UnassignedReservation,
        technician_id: &str,
        vehicle_id: Option<&str>,
        schedule: ScheduleDate,
    ) -> OperationOutcome {
        if technician_id.trim().is_empty() {
            return OperationOutcome::Unchanged;
        }

        let key = OperationKey::new(OperationVerb::Assign, reservation.id.as_str());
        let call = async {
            match reservation.delivery_task_id.as_deref() {
                Some(task_id) => {
                    self.backend
                        .assign_task(task_id, technician_id, vehicle_id)
                        .await
                }
                None => {
                    let payload = self.new_task_for(reservation, technician_id, vehicle_id, schedule);
                    self.backend.create_delivery_task(payload).await
                }
            }
        };

        self.run_guarded(key, "Technician assigned", call).await
    }

    /// Moves a task to another technician, taking that technician's vehicle.
    pub async fn reassign_task(
        &self,
        task: &DeliveryTask,
        target_technician_id: &str,
    ) -> OperationOutcome {
        if target_technician_id.trim().is_empty()
            || task.assigned_technician() == Some(target_technician_id)
        {
            debug!(task_id = %task.id, "reassign skipped: same technician");
            return OperationOutcome::Unchanged;
        }

        let vehicle_id = self.vehicle_for(target_technician_id);
        let key = OperationKey::new(OperationVerb::Reassign, task.id.as_str());
        let call = self
            .backend
            .assign_task(&task.id, target_technician_id, vehicle_id.as_deref());

        self.run_guarded(key, "Task reassigned", call).await
    }

    pub async fn unassign_task(&self, task_id: &str) -> OperationOutcome {
        let key = OperationKey::new(OperationVerb::Unassign, task_id);
        let call = self.backend.unassign_task(task_id);

        self.run_guarded(key, "Task unassigned", call).await
    }

    /// Drives the task state machine. Transitions known to be illegal from the
    /// loaded snapshot never reach the backend.
    pub async fn update_status(&self, task_id: &str, status: TaskStatus) -> OperationOutcome {
        let current = self
            .store
            .snapshot()
            .task(task_id)
            .map(|task| task.status);

        if let Some(current) = current {
            if let Err(err) = current.ensure_transition(status) {
                self.notifier.error("Status not changed", err.to_string());
                self.record(OperationVerb::Status, "rejected");
                return OperationOutcome::Failed(err);
            }
        }

        let key = OperationKey::new(OperationVerb::Status, task_id);
        let call = self.backend.update_task_status(task_id, status);

        self.run_guarded(key, "Status updated", call).await
    }

    pub async fn technician_tasks(&self, technician_id: &str) -> Result<Vec<DeliveryTask>, AppError> {
        with_timeout(self.timeout, self.backend.get_technician_tasks(technician_id)).await
    }

    fn new_task_for(
        &self,
        reservation: &UnassignedReservation,
        technician_id: &str,
        vehicle_id: Option<&str>,
        schedule: ScheduleDate,
    ) -> NewDeliveryTask {
        let scheduled_date = match schedule {
            ScheduleDate::ReservationStart => reservation.start_date,
            ScheduleDate::Selected(date) => date,
        };
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        NewDeliveryTask {
            reservation_id: reservation.id.clone(),
            order_number: reservation.order_number(),
            task_type: TaskType::Delivery,
            scheduled_date,
            scheduled_time: reservation
                .delivery_time
                .clone()
                .filter(|time| !time.trim().is_empty())
                .unwrap_or_else(|| self.default_delivery_time.clone()),
            vehicle_id: vehicle_id.map(str::to_string),
            technician_id: Some(technician_id.to_string()),
            status: TaskStatus::Scheduled,
            customer: CustomerSnapshot {
                name: text(&reservation.customer_name),
                phone: text(&reservation.customer_phone),
                email: text(&reservation.customer_email),
            },
            address: AddressSnapshot {
                street: text(&reservation.delivery_address),
                city: text(&reservation.delivery_city),
                postal_code: text(&reservation.delivery_postal_code),
            },
            products: vec![TaskProduct {
                product_id: text(&reservation.product_id),
                product_name: reservation
                    .product_name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
                quantity: reservation.quantity.unwrap_or(1),
            }],
            access_constraints: None,
            notes: reservation.notes.clone(),
        }
    }

    async fn run_guarded<F>(&self, key: OperationKey, success_title: &str, call: F) -> OperationOutcome
    where
        F: Future<Output = Result<DeliveryTask, AppError>>,
    {
        let verb = key.verb;
        let permit = match self.guard.try_acquire(key) {
            Ok(permit) => permit,
            Err(holder) => {
                debug!(operation = %holder, "operation rejected: guard held");
                self.record(verb, "busy");
                return OperationOutcome::Busy(holder);
            }
        };
        let _in_progress = InProgressGauge::raise(&self.metrics.operation_in_progress);

        let start = Instant::now();
        let result = with_timeout(self.timeout, call).await;
        self.metrics
            .operation_latency_seconds
            .with_label_values(&[verb.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(task) => {
                info!(
                    operation = %permit.key(),
                    task_id = %task.id,
                    technician_id = ?task.technician_id,
                    "planning operation applied"
                );
                self.record(verb, "success");
                self.notifier
                    .success(success_title, format!("Order {}", task.order_number));
                // Refresh failures are reported by the store itself.
                let _ = self.store.refresh().await;
                OperationOutcome::Applied(task)
            }
            Err(err) => {
                error!(operation = %permit.key(), error = %err, "planning operation failed");
                self.record(verb, "error");
                self.notifier.error("Operation failed", err.to_string());
                OperationOutcome::Failed(err)
            }
        };

        drop(permit);
        outcome
    }

    fn record(&self, verb: OperationVerb, outcome: &str) {
        self.metrics
            .operations_total
            .with_label_values(&[verb.as_str(), outcome])
            .inc();
    }
}

/// Holds the in-progress gauge at 1 until dropped, including when the
/// operation's future is cancelled.
struct InProgressGauge<'a>(&'a IntGauge);

impl<'a> InProgressGauge<'a> {
    fn raise(gauge: &'a IntGauge) -> Self {
        gauge.set(1);
        Self(gauge)
    }
}

impl Drop for InProgressGauge<'_> {
    fn drop(&mut self) {
        self.0.set(0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::backend::testing::{date, reservation, seeded_backend, RecordingBackend};
    use crate::engine::store::ViewSelection;
    use crate::models::notification::NotificationLevel;

    struct Fixture {
        backend: Arc<RecordingBackend>,
        store: Arc<TaskStore>,
        guard: OperationGuard,
        notifier: Notifier,
        metrics: Metrics,
        coordinator: Arc<AssignmentCoordinator>,
    }

    fn fixture_with_timeout(timeout: Duration) -> Fixture {
        let backend = Arc::new(RecordingBackend::new(seeded_backend()));
        let notifier = Notifier::new(32);
        let metrics = Metrics::new();
        let guard = OperationGuard::new();
        let store = Arc::new(TaskStore::new(
            backend.clone(),
            notifier.clone(),
            metrics.clone(),
            timeout,
        ));
        let coordinator = Arc::new(AssignmentCoordinator::new(
            backend.clone(),
            store.clone(),
            guard.clone(),
            notifier.clone(),
            metrics.clone(),
            timeout,
            "10:00",
        ));
        Fixture {
            backend,
            store,
            guard,
            notifier,
            metrics,
            coordinator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_timeout(Duration::from_secs(2))
    }

    async fn load_day(fixture: &Fixture) {
        fixture
            .store
            .load(ViewSelection::Day { date: date(2026, 2, 1) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reservation_without_task_creates_one() {
        let fx = fixture();
        let r1 = reservation("r1", date(2026, 2, 1));
        fx.backend.inner.upsert_reservation(r1.clone());
        load_day(&fx).await;

        let outcome = fx
            .coordinator
            .assign_reservation(&r1, "T1", Some("V1"), ScheduleDate::ReservationStart)
            .await;

        let OperationOutcome::Applied(task) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(fx.backend.count("create_delivery_task"), 1);
        assert_eq!(fx.backend.count("assign_task"), 0);
        assert!(task.order_number.starts_with("ORD-"));
        assert_eq!(task.order_number, "ORD-r1");
        assert_eq!(task.scheduled_date, date(2026, 2, 1));
        assert_eq!(task.scheduled_time, "10:00");
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert_eq!(task.technician_id.as_deref(), Some("T1"));
        assert_eq!(task.vehicle_id.as_deref(), Some("V1"));
        assert_eq!(task.products[0].product_name, "Borne arcade");
        assert_eq!(task.products[0].quantity, 2);
        assert_eq!(task.customer.phone, "");
    }

    #[tokio::test]
    async fn missing_product_details_fall_back_to_defaults() {
        let fx = fixture();
        let mut bare = reservation("r-bare", date(2026, 2, 1));
        bare.product_name = None;
        bare.quantity = None;
        bare.delivery_time = Some("08:30".to_string());

        let outcome = fx
            .coordinator
            .assign_reservation(&bare, "T2", None, ScheduleDate::Selected(date(2026, 2, 5)))
            .await;

        let OperationOutcome::Applied(task) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(task.products[0].product_name, "Produit");
        assert_eq!(task.products[0].quantity, 1);
        assert_eq!(task.scheduled_time, "08:30");
        assert_eq!(task.scheduled_date, date(2026, 2, 5));
    }

    #[tokio::test]
    async fn reservation_with_task_updates_it() {
        let fx = fixture();
        fx.backend
            .inner
            .upsert_reservation(reservation("r1", date(2026, 2, 1)));
        let existing = fx
            .backend
            .inner
            .create_delivery_task(crate::backend::testing::new_task("r1", date(2026, 2, 1)))
            .await
            .unwrap();
        load_day(&fx).await;
        let linked = fx.store.snapshot().reservation("r1").cloned().unwrap();
        assert_eq!(linked.delivery_task_id.as_deref(), Some(existing.id.as_str()));

        let outcome = fx
            .coordinator
            .assign_reservation(&linked, "T1", Some("V1"), ScheduleDate::ReservationStart)
            .await;

        assert!(outcome.is_applied());
        assert_eq!(fx.backend.count("assign_task"), 1);
        assert_eq!(fx.backend.count("create_delivery_task"), 0);
        // Refreshed snapshot no longer lists the reservation.
        assert!(fx.store.snapshot().reservation("r1").is_none());
    }

    #[tokio::test]
    async fn reassign_to_same_technician_makes_no_call() {
        let fx = fixture();
        let task = crate::backend::testing::task("t1", Some("T1"), "10:00");

        let outcome = fx.coordinator.reassign_task(&task, "T1").await;

        assert!(matches!(outcome, OperationOutcome::Unchanged));
        assert!(fx.backend.calls().is_empty());
        assert!(!fx.guard.is_locked());
    }

    #[tokio::test]
    async fn reassign_takes_target_technicians_vehicle() {
        let fx = fixture();
        let created = fx
            .backend
            .inner
            .create_delivery_task(crate::backend::testing::new_task("r1", date(2026, 2, 1)))
            .await
            .unwrap();
        fx.backend.inner.assign_task(&created.id, "T2", None).await.unwrap();
        load_day(&fx).await;
        let task = fx.store.snapshot().task(&created.id).cloned().unwrap();

        let outcome = fx.coordinator.reassign_task(&task, "T1").await;

        let OperationOutcome::Applied(moved) = outcome else {
            panic!("expected applied outcome");
        };
        assert_eq!(moved.technician_id.as_deref(), Some("T1"));
        assert_eq!(moved.vehicle_id.as_deref(), Some("V1"));
    }

    #[tokio::test]
    async fn empty_selection_is_ignored() {
        let fx = fixture();
        let r1 = reservation("r1", date(2026, 2, 1));

        let outcome = fx
            .coordinator
            .assign_reservation(&r1, "", None, ScheduleDate::ReservationStart)
            .await;

        assert!(matches!(outcome, OperationOutcome::Unchanged));
        assert!(fx.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn failure_notifies_and_releases_guard() {
        let fx = fixture();
        let mut notifications = fx.notifier.subscribe();
        fx.backend.fail_on("unassign_task");

        let outcome = fx.coordinator.unassign_task("t-missing").await;

        assert!(matches!(outcome, OperationOutcome::Failed(AppError::Backend(_))));
        assert!(!fx.guard.is_locked());
        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn second_operation_is_rejected_while_first_runs() {
        let fx = fixture_with_timeout(Duration::from_secs(5));
        fx.backend.stall_on("unassign_task");

        let coordinator = fx.coordinator.clone();
        let running = tokio::spawn(async move { coordinator.unassign_task("t1").await });
        while !fx.guard.is_locked() {
            tokio::task::yield_now().await;
        }

        let task = crate::backend::testing::task("t2", Some("T1"), "10:00");
        let outcome = fx.coordinator.reassign_task(&task, "T2").await;

        let OperationOutcome::Busy(key) = outcome else {
            panic!("expected busy outcome");
        };
        assert_eq!(key.to_string(), "unassign-t1");
        assert_eq!(fx.backend.count("assign_task"), 0);
        running.abort();
    }

    #[tokio::test]
    async fn cancelled_operation_releases_guard_and_gauge() {
        let fx = fixture_with_timeout(Duration::from_secs(5));
        fx.backend.stall_on("unassign_task");

        let coordinator = fx.coordinator.clone();
        let running = tokio::spawn(async move { coordinator.unassign_task("t1").await });
        while !fx.guard.is_locked() {
            tokio::task::yield_now().await;
        }
        assert_eq!(fx.metrics.operation_in_progress.get(), 1);

        running.abort();
        let _ = running.await;

        assert!(!fx.guard.is_locked());
        assert_eq!(fx.metrics.operation_in_progress.get(), 0);
    }

    #[tokio::test]
    async fn hung_call_times_out_and_unlocks() {
        let fx = fixture_with_timeout(Duration::from_millis(50));
        fx.backend.stall_on("unassign_task");

        let outcome = fx.coordinator.unassign_task("t1").await;

        assert!(matches!(outcome, OperationOutcome::Failed(AppError::Timeout(50))));
        assert!(!fx.guard.is_locked());
    }

    #[tokio::test]
    async fn illegal_transition_never_reaches_backend() {
        let fx = fixture();
        fx.backend
            .inner
            .create_delivery_task(crate::backend::testing::new_task("r1", date(2026, 2, 1)))
            .await
            .unwrap();
        load_day(&fx).await;
        let task_id = fx.store.snapshot().tasks[0].id.clone();

        let outcome = fx
            .coordinator
            .update_status(&task_id, TaskStatus::Completed)
            .await;

        assert!(matches!(
            outcome,
            OperationOutcome::Failed(AppError::InvalidTransition(_))
        ));
        assert_eq!(fx.backend.count("update_task_status"), 0);

        let started = fx
            .coordinator
            .update_status(&task_id, TaskStatus::InProgress)
            .await;
        assert!(started.is_applied());
    }

    #[tokio::test]
    async fn same_state_status_change_is_rejected() {
        let fx = fixture();
        fx.backend
            .inner
            .create_delivery_task(crate::backend::testing::new_task("r1", date(2026, 2, 1)))
            .await
            .unwrap();
        load_day(&fx).await;
        let task = fx.store.snapshot().tasks[0].clone();
        assert_eq!(task.status, TaskStatus::Scheduled);

        let outcome = fx
            .coordinator
            .update_status(&task.id, TaskStatus::Scheduled)
            .await;

        assert!(matches!(
            outcome,
            OperationOutcome::Failed(AppError::InvalidTransition(_))
        ));
        assert_eq!(fx.backend.count("update_task_status"), 0);
        assert!(!fx.guard.is_locked());
    }
}
