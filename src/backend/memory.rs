use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::PlanningBackend;
use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::{DeliveryTask, NewDeliveryTask, TaskStatus, TaskType};
use crate::models::technician::Technician;
use crate::models::vehicle::Vehicle;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlanningFixtures {
    pub vehicles: Vec<Vehicle>,
    pub technicians: Vec<Technician>,
    pub tasks: Vec<DeliveryTask>,
    pub reservations: Vec<UnassignedReservation>,
}

impl PlanningFixtures {
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
            AppError::Internal(format!("failed to read {}: {err}", path.display()))
        })?;

        serde_json::from_str(&raw).map_err(|err| {
            AppError::Internal(format!("invalid fixtures in {}: {err}", path.display()))
        })
    }
}

/// Process-local stand-in for the hosted database.
#[derive(Default)]
pub struct InMemoryBackend {
    vehicles: DashMap<String, Vehicle>,
    technicians: DashMap<String, Technician>,
    tasks: DashMap<String, DeliveryTask>,
    reservations: DashMap<String, UnassignedReservation>,
    // Serializes the uniqueness check and insert in create_delivery_task.
    create_lock: Mutex<()>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixtures(fixtures: PlanningFixtures) -> Self {
        let backend = Self::new();
        for vehicle in fixtures.vehicles {
            backend.upsert_vehicle(vehicle);
        }
        for technician in fixtures.technicians {
            backend.upsert_technician(technician);
        }
        for task in fixtures.tasks {
            backend.tasks.insert(task.id.clone(), task);
        }
        for reservation in fixtures.reservations {
            backend.upsert_reservation(reservation);
        }

        info!(
            vehicles = backend.vehicles.len(),
            technicians = backend.technicians.len(),
            tasks = backend.tasks.len(),
            reservations = backend.reservations.len(),
            "in-memory backend seeded"
        );
        backend
    }

    pub fn upsert_vehicle(&self, vehicle: Vehicle) {
        self.vehicles.insert(vehicle.id.clone(), vehicle);
    }

    pub fn upsert_technician(&self, technician: Technician) {
        self.technicians.insert(technician.id.clone(), technician);
    }

    pub fn upsert_reservation(&self, mut reservation: UnassignedReservation) {
        // The link to a task is derived on read, never stored.
        reservation.delivery_task_id = None;
        self.reservations.insert(reservation.id.clone(), reservation);
    }

    pub fn task(&self, task_id: &str) -> Option<DeliveryTask> {
        self.tasks.get(task_id).map(|entry| entry.value().clone())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn delivery_task_for(&self, reservation_id: &str) -> Option<DeliveryTask> {
        self.tasks
            .iter()
            .find(|entry| {
                let task = entry.value();
                task.reservation_id == reservation_id
                    && task.task_type == TaskType::Delivery
                    && task.status != TaskStatus::Cancelled
            })
            .map(|entry| entry.value().clone())
    }

    fn collect_tasks<F>(&self, predicate: F) -> Vec<DeliveryTask>
    where
        F: Fn(&DeliveryTask) -> bool,
    {
        let mut tasks: Vec<DeliveryTask> = self
            .tasks
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        tasks.sort_by(|a, b| {
            a.scheduled_date
                .cmp(&b.scheduled_date)
                .then_with(|| a.scheduled_time.cmp(&b.scheduled_time))
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    fn update_task<F>(&self, task_id: &str, update: F) -> Result<DeliveryTask, AppError>
    where
        F: FnOnce(&mut DeliveryTask) -> Result<(), AppError>,
    {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| AppError::NotFound(format!("task {task_id} not found")))?;

        update(task.value_mut())?;
        Ok(task.value().clone())
    }
}

#[async_trait]
impl PlanningBackend for InMemoryBackend {
    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        let mut vehicles: Vec<Vehicle> = self
            .vehicles
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();
        vehicles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(vehicles)
    }

    async fn get_all_technicians(&self) -> Result<Vec<Technician>, AppError> {
        let mut technicians: Vec<Technician> = self
            .technicians
            .iter()
            .filter(|entry| entry.value().active)
            .map(|entry| entry.value().clone())
            .collect();
        technicians.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(technicians)
    }

    async fn get_tasks_by_date(&self, date: NaiveDate) -> Result<Vec<DeliveryTask>, AppError> {
        Ok(self.collect_tasks(|task| task.scheduled_date == date))
    }

    async fn get_tasks_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryTask>, AppError> {
        if from > to {
            return Err(AppError::BadRequest(format!(
                "empty date range {from}..{to}"
            )));
        }
        Ok(self.collect_tasks(|task| task.scheduled_date >= from && task.scheduled_date <= to))
    }

    async fn get_unassigned_reservations(&self) -> Result<Vec<UnassignedReservation>, AppError> {
        let mut pending: Vec<UnassignedReservation> = self
            .reservations
            .iter()
            .filter_map(|entry| {
                let reservation = entry.value();
                match self.delivery_task_for(&reservation.id) {
                    Some(task) if task.is_assigned() => None,
                    Some(task) => {
                        let mut linked = reservation.clone();
                        linked.delivery_task_id = Some(task.id);
                        Some(linked)
                    }
                    None => Some(reservation.clone()),
                }
            })
            .collect();

        pending.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn create_delivery_task(
        &self,
        payload: NewDeliveryTask,
    ) -> Result<DeliveryTask, AppError> {
        let _guard = self
            .create_lock
            .lock()
            .map_err(|_| AppError::Internal("create lock poisoned".to_string()))?;

        let duplicate = self.tasks.iter().any(|entry| {
            let task = entry.value();
            task.reservation_id == payload.reservation_id
                && task.task_type == payload.task_type
                && task.status != TaskStatus::Cancelled
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "reservation {} already has an active task for this leg",
                payload.reservation_id
            )));
        }

        let task = payload.into_task(Uuid::new_v4().to_string());
        self.tasks.insert(task.id.clone(), task.clone());

        debug!(task_id = %task.id, reservation_id = %task.reservation_id, "task created");
        Ok(task)
    }

    async fn assign_task(
        &self,
        task_id: &str,
        technician_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<DeliveryTask, AppError> {
        if !self.technicians.contains_key(technician_id) {
            return Err(AppError::NotFound(format!(
                "technician {technician_id} not found"
            )));
        }

        self.update_task(task_id, |task| {
            task.technician_id = Some(technician_id.to_string());
            task.vehicle_id = vehicle_id.map(str::to_string);
            Ok(())
        })
    }

    async fn unassign_task(&self, task_id: &str) -> Result<DeliveryTask, AppError> {
        self.update_task(task_id, |task| {
            task.technician_id = None;
            task.vehicle_id = None;
            Ok(())
        })
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<DeliveryTask, AppError> {
        self.update_task(task_id, |task| {
            task.status.ensure_transition(status)?;
            task.status = status;
            match status {
                TaskStatus::InProgress => task.started_at = Some(Utc::now()),
                TaskStatus::Completed => task.completed_at = Some(Utc::now()),
                TaskStatus::Scheduled | TaskStatus::Cancelled => {}
            }
            Ok(())
        })
    }

    async fn get_technician_tasks(
        &self,
        technician_id: &str,
    ) -> Result<Vec<DeliveryTask>, AppError> {
        Ok(self.collect_tasks(|task| task.assigned_technician() == Some(technician_id)))
    }
}
