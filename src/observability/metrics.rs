use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub operations_total: IntCounterVec,
    pub operation_latency_seconds: HistogramVec,
    pub loads_total: IntCounterVec,
    pub operation_in_progress: IntGauge,
    pub snapshot_tasks: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let operations_total = IntCounterVec::new(
            Opts::new(
                "planning_operations_total",
                "Planning operations by verb and outcome",
            ),
            &["verb", "outcome"],
        )
        .expect("valid planning_operations_total metric");

        let operation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "planning_operation_latency_seconds",
                "Latency of guarded planning operations in seconds",
            ),
            &["verb"],
        )
        .expect("valid planning_operation_latency_seconds metric");

        let loads_total = IntCounterVec::new(
            Opts::new("planning_loads_total", "Task store fetches by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid planning_loads_total metric");

        let operation_in_progress = IntGauge::new(
            "planning_operation_in_progress",
            "1 while a planning operation holds the guard",
        )
        .expect("valid planning_operation_in_progress metric");

        let snapshot_tasks = IntGauge::new(
            "planning_snapshot_tasks",
            "Number of tasks in the current planning snapshot",
        )
        .expect("valid planning_snapshot_tasks metric");

        registry
            .register(Box::new(operations_total.clone()))
            .expect("register planning_operations_total");
        registry
            .register(Box::new(operation_latency_seconds.clone()))
            .expect("register planning_operation_latency_seconds");
        registry
            .register(Box::new(loads_total.clone()))
            .expect("register planning_loads_total");
        registry
            .register(Box::new(operation_in_progress.clone()))
            .expect("register planning_operation_in_progress");
        registry
            .register(Box::new(snapshot_tasks.clone()))
            .expect("register planning_snapshot_tasks");

        Self {
            registry,
            operations_total,
            operation_latency_seconds,
            loads_total,
            operation_in_progress,
            snapshot_tasks,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
