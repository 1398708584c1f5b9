use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::backend::{InMemoryBackend, PlanningBackend};
use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::{
    AddressSnapshot, CustomerSnapshot, DeliveryTask, NewDeliveryTask, TaskStatus, TaskType,
};
use crate::models::technician::Technician;
use crate::models::vehicle::{Vehicle, VehicleType};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn technician(id: &str, name: &str, vehicle_id: Option<&str>) -> Technician {
    Technician {
        id: id.to_string(),
        name: name.to_string(),
        phone: "0600000000".to_string(),
        vehicle_id: vehicle_id.map(str::to_string),
        active: true,
    }
}

pub fn vehicle(id: &str) -> Vehicle {
    Vehicle {
        id: id.to_string(),
        name: format!("Camion {id}"),
        vehicle_type: VehicleType::Truck,
        capacity: 12,
        license_plate: format!("AA-{id}-ZZ"),
        active: true,
    }
}

pub fn reservation(id: &str, start_date: NaiveDate) -> UnassignedReservation {
    UnassignedReservation {
        id: id.to_string(),
        start_date,
        end_date: None,
        delivery_time: None,
        delivery_task_id: None,
        customer_name: Some("Claire Martin".to_string()),
        customer_phone: None,
        customer_email: None,
        delivery_address: Some("12 rue des Lilas".to_string()),
        delivery_city: Some("Lyon".to_string()),
        delivery_postal_code: None,
        product_id: Some("p-arcade".to_string()),
        product_name: Some("Borne arcade".to_string()),
        quantity: Some(2),
        notes: None,
    }
}

pub fn new_task(reservation_id: &str, scheduled_date: NaiveDate) -> NewDeliveryTask {
    NewDeliveryTask {
        reservation_id: reservation_id.to_string(),
        order_number: format!("ORD-{reservation_id}"),
        task_type: TaskType::Delivery,
        scheduled_date,
        scheduled_time: "10:00".to_string(),
        vehicle_id: None,
        technician_id: None,
        status: TaskStatus::Scheduled,
        customer: CustomerSnapshot::default(),
        address: AddressSnapshot::default(),
        products: Vec::new(),
        access_constraints: None,
        notes: None,
    }
}

pub fn task(id: &str, technician_id: Option<&str>, scheduled_time: &str) -> DeliveryTask {
    let mut task = new_task(&format!("res-{id}"), date(2026, 2, 1)).into_task(id.to_string());
    task.technician_id = technician_id.map(str::to_string);
    task.scheduled_time = scheduled_time.to_string();
    task
}

/// Two active technicians (T1 with V1, T2 without a vehicle) and one inactive.
pub fn seeded_backend() -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.upsert_vehicle(vehicle("V1"));
    backend.upsert_technician(technician("T1", "Alice", Some("V1")));
    backend.upsert_technician(technician("T2", "Bruno", None));
    let mut retired = technician("T3", "Aaron", None);
    retired.active = false;
    backend.upsert_technician(retired);
    backend
}

/// Wraps the in-memory backend, recording every call and optionally failing
/// or stalling chosen ones.
pub struct RecordingBackend {
    pub inner: InMemoryBackend,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
    stalling: Mutex<HashSet<&'static str>>,
    slow_dates: Mutex<HashMap<NaiveDate, Duration>>,
}

impl RecordingBackend {
    pub fn new(inner: InMemoryBackend) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            stalling: Mutex::new(HashSet::new()),
            slow_dates: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_on(&self, call: &'static str) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn stall_on(&self, call: &'static str) {
        self.stalling.lock().unwrap().insert(call);
    }

    /// Delays `get_tasks_by_date` for one date only.
    pub fn slow_date(&self, date: NaiveDate, delay: Duration) {
        self.slow_dates.lock().unwrap().insert(date, delay);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &'static str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    async fn enter(&self, call: &'static str) -> Result<(), AppError> {
        self.calls.lock().unwrap().push(call);
        let stall = self.stalling.lock().unwrap().contains(call);
        if stall {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.failing.lock().unwrap().contains(call) {
            return Err(AppError::Backend(format!("{call} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl PlanningBackend for RecordingBackend {
    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>, AppError> {
        self.enter("get_all_vehicles").await?;
        self.inner.get_all_vehicles().await
    }

    async fn get_all_technicians(&self) -> Result<Vec<Technician>, AppError> {
        self.enter("get_all_technicians").await?;
        self.inner.get_all_technicians().await
    }

    async fn get_tasks_by_date(&self, date: NaiveDate) -> Result<Vec<DeliveryTask>, AppError> {
        self.enter("get_tasks_by_date").await?;
        let delay = self.slow_dates.lock().unwrap().get(&date).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get_tasks_by_date(date).await
    }

    async fn get_tasks_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryTask>, AppError> {
        self.enter("get_tasks_between").await?;
        self.inner.get_tasks_between(from, to).await
    }

    async fn get_unassigned_reservations(&self) -> Result<Vec<UnassignedReservation>, AppError> {
        self.enter("get_unassigned_reservations").await?;
        self.inner.get_unassigned_reservations().await
    }

    async fn create_delivery_task(
        &self,
        payload: NewDeliveryTask,
    ) -> Result<DeliveryTask, AppError> {
        self.enter("create_delivery_task").await?;
        self.inner.create_delivery_task(payload).await
    }

    async fn assign_task(
        &self,
        task_id: &str,
        technician_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<DeliveryTask, AppError> {
        self.enter("assign_task").await?;
        self.inner.assign_task(task_id, technician_id, vehicle_id).await
    }

    async fn unassign_task(&self, task_id: &str) -> Result<DeliveryTask, AppError> {
        self.enter("unassign_task").await?;
        self.inner.unassign_task(task_id).await
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<DeliveryTask, AppError> {
        self.enter("update_task_status").await?;
        self.inner.update_task_status(task_id, status).await
    }

    async fn get_technician_tasks(
        &self,
        technician_id: &str,
    ) -> Result<Vec<DeliveryTask>, AppError> {
        self.enter("get_technician_tasks").await?;
        self.inner.get_technician_tasks(technician_id).await
    }
}
