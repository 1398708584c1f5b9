use std::sync::Arc;

use serde::Serialize;

use crate::backend::PlanningBackend;
use crate::config::Config;
use crate::engine::coordinator::AssignmentCoordinator;
use crate::engine::drag_drop::{DragDropController, DragKind};
use crate::engine::guard::{OperationGuard, OperationKey};
use crate::engine::notifier::Notifier;
use crate::engine::store::TaskStore;
use crate::observability::metrics::Metrics;

/// Everything one planning view owns: snapshot, operation guard, drag state.
/// Separate sessions never share a lock.
pub struct PlanningSession {
    pub store: Arc<TaskStore>,
    pub guard: OperationGuard,
    pub coordinator: Arc<AssignmentCoordinator>,
    pub drag: DragDropController,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub loading: bool,
    pub operation_in_progress: Option<String>,
    pub operation: Option<OperationKey>,
    pub last_error: Option<String>,
    pub dragging: Option<DragKind>,
    pub drop_target: Option<String>,
}

impl PlanningSession {
    pub fn new(
        backend: Arc<dyn PlanningBackend>,
        notifier: Notifier,
        metrics: Metrics,
        config: &Config,
    ) -> Self {
        let guard = OperationGuard::new();
        let store = Arc::new(TaskStore::new(
            backend.clone(),
            notifier.clone(),
            metrics.clone(),
            config.operation_timeout,
        ));
        let coordinator = Arc::new(AssignmentCoordinator::new(
            backend,
            store.clone(),
            guard.clone(),
            notifier,
            metrics,
            config.operation_timeout,
            config.default_delivery_time.clone(),
        ));
        let drag = DragDropController::new(guard.clone(), store.clone(), coordinator.clone());

        Self {
            store,
            guard,
            coordinator,
            drag,
        }
    }

    pub fn status(&self) -> SessionStatus {
        let operation = self.guard.current();
        let drag = self.drag.status();

        SessionStatus {
            loading: self.store.is_loading(),
            operation_in_progress: operation.as_ref().map(|key| key.to_string()),
            operation,
            last_error: self.store.last_error(),
            dragging: drag.dragging,
            drop_target: drag.drop_target,
        }
    }
}
