use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::coordinator::{AssignmentCoordinator, OperationOutcome, ScheduleDate};
use crate::engine::guard::OperationGuard;
use crate::engine::store::TaskStore;
use crate::error::AppError;
use crate::models::reservation::UnassignedReservation;
use crate::models::task::{DeliveryTask, UNASSIGNED_GROUP};

#[derive(Debug, Clone)]
pub enum DragPayload {
    Task(DeliveryTask),
    Reservation(UnassignedReservation),
}

impl DragPayload {
    fn entity_id(&self) -> &str {
        match self {
            DragPayload::Task(task) => &task.id,
            DragPayload::Reservation(reservation) => &reservation.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragKind {
    Task,
    Reservation,
}

#[derive(Debug, Clone, Serialize)]
pub struct DragStatus {
    pub dragging: Option<DragKind>,
    pub dragged_id: Option<String>,
    pub drop_target: Option<String>,
}

#[derive(Debug, Default)]
struct DragState {
    dragged_task: Option<DeliveryTask>,
    dragged_reservation: Option<UnassignedReservation>,
    drop_target: Option<String>,
}

impl DragState {
    fn reset(&mut self) {
        self.dragged_task = None;
        self.dragged_reservation = None;
        self.drop_target = None;
    }
}

/// Drag sources are task cards and unassigned reservation cards; drop targets
/// are technician columns keyed by technician id (or `__unassigned__`).
pub struct DragDropController {
    state: Mutex<DragState>,
    guard: OperationGuard,
    store: Arc<TaskStore>,
    coordinator: Arc<AssignmentCoordinator>,
}

impl DragDropController {
    pub fn new(
        guard: OperationGuard,
        store: Arc<TaskStore>,
        coordinator: Arc<AssignmentCoordinator>,
    ) -> Self {
        Self {
            state: Mutex::new(DragState::default()),
            guard,
            store,
            coordinator,
        }
    }

    /// Sources are not draggable while an operation is running.
    pub fn can_drag(&self, entity_id: &str) -> bool {
        !self.guard.is_locked() && !self.guard.is_busy(entity_id)
    }

    pub fn drag_start(&self, payload: DragPayload) -> Result<(), AppError> {
        if !self.can_drag(payload.entity_id()) {
            let current = self
                .guard
                .current()
                .map(|key| key.to_string())
                .unwrap_or_default();
            return Err(AppError::OperationInProgress(current));
        }

        let mut state = self.lock();
        state.reset();
        match payload {
            DragPayload::Task(task) => state.dragged_task = Some(task),
            DragPayload::Reservation(reservation) => state.dragged_reservation = Some(reservation),
        }
        Ok(())
    }

    /// Highlights `target_id`. Returns false when nothing is being dragged or
    /// the target was already highlighted.
    pub fn drag_over(&self, target_id: &str) -> bool {
        let mut state = self.lock();
        if state.dragged_task.is_none() && state.dragged_reservation.is_none() {
            return false;
        }
        if state.drop_target.as_deref() == Some(target_id) {
            return false;
        }
        state.drop_target = Some(target_id.to_string());
        true
    }

    /// Clears the highlight unless the pointer only moved onto a child of the
    /// target.
    pub fn drag_leave(&self, target_id: &str, pointer_within_target: bool) -> bool {
        if pointer_within_target {
            return false;
        }

        let mut state = self.lock();
        if state.drop_target.as_deref() != Some(target_id) {
            return false;
        }
        state.drop_target = None;
        true
    }

    pub async fn drop_on(&self, technician_id: &str) -> OperationOutcome {
        // Taking the payload up front clears the slots whatever happens next.
        let (reservation, task) = {
            let mut state = self.lock();
            let taken = (
                state.dragged_reservation.take(),
                state.dragged_task.take(),
            );
            state.reset();
            taken
        };

        if let Some(reservation) = reservation {
            if technician_id == UNASSIGNED_GROUP {
                return OperationOutcome::Unchanged;
            }
            let vehicle_id = self.coordinator.vehicle_for(technician_id);
            let schedule = self
                .store
                .selection()
                .and_then(|selection| selection.selected_date())
                .map(ScheduleDate::Selected)
                .unwrap_or(ScheduleDate::ReservationStart);

            debug!(reservation_id = %reservation.id, technician_id, "reservation dropped");
            return self
                .coordinator
                .assign_reservation(&reservation, technician_id, vehicle_id.as_deref(), schedule)
                .await;
        }

        match task {
            Some(task) if technician_id == UNASSIGNED_GROUP => {
                if !task.is_assigned() {
                    return OperationOutcome::Unchanged;
                }
                debug!(task_id = %task.id, "task dropped on unassigned column");
                self.coordinator.unassign_task(&task.id).await
            }
            Some(task) => {
                debug!(task_id = %task.id, technician_id, "task dropped");
                self.coordinator.reassign_task(&task, technician_id).await
            }
            None => OperationOutcome::Unchanged,
        }
    }

    /// Drag cancelled (Escape, or released outside any column).
    pub fn drag_end(&self) {
        self.lock().reset();
    }

    pub fn status(&self) -> DragStatus {
        let state = self.lock();
        let (dragging, dragged_id) = if let Some(reservation) = &state.dragged_reservation {
            (Some(DragKind::Reservation), Some(reservation.id.clone()))
        } else if let Some(task) = &state.dragged_task {
            (Some(DragKind::Task), Some(task.id.clone()))
        } else {
            (None, None)
        };

        DragStatus {
            dragging,
            dragged_id,
            drop_target: state.drop_target.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DragState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
