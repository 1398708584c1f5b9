use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Grouping key used for tasks without a technician.
pub const UNASSIGNED_GROUP: &str = "__unassigned__";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Delivery,
    Pickup,
    ClientPickup,
    ClientReturn,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    /// `scheduled -> in_progress -> completed`, and `scheduled | in_progress -> cancelled`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Scheduled, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::Scheduled, TaskStatus::Cancelled)
                | (TaskStatus::InProgress, TaskStatus::Cancelled)
        )
    }

    pub fn ensure_transition(self, next: TaskStatus) -> Result<(), AppError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition(format!(
                "{} -> {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerSnapshot {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddressSnapshot {
    pub street: String,
    pub city: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskProduct {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTask {
    pub id: String,
    pub reservation_id: String,
    pub order_number: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub technician_id: Option<String>,
    pub status: TaskStatus,
    pub customer: CustomerSnapshot,
    pub address: AddressSnapshot,
    #[serde(default)]
    pub products: Vec<TaskProduct>,
    #[serde(default)]
    pub access_constraints: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeliveryTask {
    /// An empty technician id counts as unassigned, same as a missing one.
    pub fn assigned_technician(&self) -> Option<&str> {
        self.technician_id
            .as_deref()
            .filter(|technician_id| !technician_id.is_empty())
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_technician().is_some()
    }

    pub fn group_key(&self) -> &str {
        self.assigned_technician().unwrap_or(UNASSIGNED_GROUP)
    }
}

/// Payload for `create_delivery_task`: a task minus its generated id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewDeliveryTask {
    pub reservation_id: String,
    pub order_number: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub vehicle_id: Option<String>,
    pub technician_id: Option<String>,
    pub status: TaskStatus,
    pub customer: CustomerSnapshot,
    pub address: AddressSnapshot,
    pub products: Vec<TaskProduct>,
    pub access_constraints: Option<String>,
    pub notes: Option<String>,
}

impl NewDeliveryTask {
    pub fn into_task(self, id: String) -> DeliveryTask {
        DeliveryTask {
            id,
            reservation_id: self.reservation_id,
            order_number: self.order_number,
            task_type: self.task_type,
            scheduled_date: self.scheduled_date,
            scheduled_time: self.scheduled_time,
            vehicle_id: self.vehicle_id,
            technician_id: self.technician_id,
            status: self.status,
            customer: self.customer,
            address: self.address,
            products: self.products,
            access_constraints: self.access_constraints,
            notes: self.notes,
            started_at: None,
            completed_at: None,
        }
    }
}
