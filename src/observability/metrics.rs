use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub advance_runs_total: IntCounterVec,
    pub advance_latency_seconds: HistogramVec,
    pub order_transitions_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let advance_runs_total = IntCounterVec::new(
            Opts::new(
                "advance_runs_total",
                "Status progression runs by trigger and outcome",
            ),
            &["trigger", "outcome"],
        )
        .expect("valid advance_runs_total metric");

        let advance_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "advance_latency_seconds",
                "Latency of status progression runs in seconds",
            ),
            &["trigger"],
        )
        .expect("valid advance_latency_seconds metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Committed order status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        registry
            .register(Box::new(advance_runs_total.clone()))
            .expect("register advance_runs_total");
        registry
            .register(Box::new(advance_latency_seconds.clone()))
            .expect("register advance_latency_seconds");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");

        Self {
            registry,
            advance_runs_total,
            advance_latency_seconds,
            order_transitions_total,
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
