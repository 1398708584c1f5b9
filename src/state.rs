use std::sync::Arc;

use crate::backend::PlanningBackend;
use crate::config::Config;
use crate::engine::notifier::Notifier;
use crate::engine::session::PlanningSession;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub backend: Arc<dyn PlanningBackend>,
    pub session: Arc<PlanningSession>,
    pub notifier: Notifier,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(backend: Arc<dyn PlanningBackend>, config: &Config) -> Self {
        let notifier = Notifier::new(config.event_buffer_size);
        let metrics = Metrics::new();
        let session = Arc::new(PlanningSession::new(
            backend.clone(),
            notifier.clone(),
            metrics.clone(),
            config,
        ));

        Self {
            backend,
            session,
            notifier,
            metrics,
        }
    }
}
