pub mod memory;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::{DeliveryTask, NewDeliveryTask, TaskStatus};
use crate::models::technician::Technician;
use crate::models::vehicle::Vehicle;

pub use memory::{InMemoryBackend, PlanningFixtures};

/// The persistence service the planning core talks to. Everything behind it
/// (database, query language) is somebody else's problem.
#[async_trait]
pub trait PlanningBackend: Send + Sync {
    /// Active vehicles only.
    async fn get_all_vehicles(&self) -> Result<Vec<Vehicle>, AppError>;

    /// Active technicians only, sorted by name.
    async fn get_all_technicians(&self) -> Result<Vec<Technician>, AppError>;

    async fn get_tasks_by_date(&self, date: NaiveDate) -> Result<Vec<DeliveryTask>, AppError>;

    /// Inclusive on both ends. Used by the month view.
    async fn get_tasks_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DeliveryTask>, AppError>;

    /// Reservations needing a delivery technician, any date.
    async fn get_unassigned_reservations(&self) -> Result<Vec<UnassignedReservation>, AppError>;

    async fn create_delivery_task(&self, payload: NewDeliveryTask)
        -> Result<DeliveryTask, AppError>;

    /// Sets technician and vehicle. Never touches the status.
    async fn assign_task(
        &self,
        task_id: &str,
        technician_id: &str,
        vehicle_id: Option<&str>,
    ) -> Result<DeliveryTask, AppError>;

    async fn unassign_task(&self, task_id: &str) -> Result<DeliveryTask, AppError>;

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<DeliveryTask, AppError>;

    async fn get_technician_tasks(&self, technician_id: &str)
        -> Result<Vec<DeliveryTask>, AppError>;
}
