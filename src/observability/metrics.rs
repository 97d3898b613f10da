use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub status_transitions_total: IntCounterVec,
    pub agent_workload: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of agent selection in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Delivery status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let agent_workload = GaugeVec::new(
            Opts::new("agent_workload", "Current non-terminal deliveries per agent"),
            &["agent_id"],
        )
        .expect("valid agent_workload metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(agent_workload.clone()))
            .expect("register agent_workload");

        // Pre-create the fixed label sets so the exposition is never empty.
        for outcome in ["assigned", "deferred"] {
            assignments_total.with_label_values(&[outcome]);
            assignment_latency_seconds.with_label_values(&[outcome]);
        }

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            status_transitions_total,
            agent_workload,
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
