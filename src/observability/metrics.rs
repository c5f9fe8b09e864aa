use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub orders_in_queue: IntGauge,
    pub delivery_transitions_total: IntCounterVec,
    pub deliveries_expired_total: IntCounter,
    pub reassignments_total: IntCounterVec,
    pub reconciliation_gaps_total: IntCounter,
    pub rider_active_deliveries: IntGaugeVec,
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
            HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment attempts in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let orders_in_queue = IntGauge::new(
            "orders_in_queue",
            "Paid orders waiting for the assignment engine",
        )
        .expect("valid orders_in_queue metric");

        let delivery_transitions_total = IntCounterVec::new(
            Opts::new(
                "delivery_transitions_total",
                "Accepted delivery status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid delivery_transitions_total metric");

        let deliveries_expired_total = IntCounter::new(
            "deliveries_expired_total",
            "Offers that lapsed without a rider response",
        )
        .expect("valid deliveries_expired_total metric");

        let reassignments_total = IntCounterVec::new(
            Opts::new("reassignments_total", "Reassignments by trigger"),
            &["trigger"],
        )
        .expect("valid reassignments_total metric");

        let reconciliation_gaps_total = IntCounter::new(
            "reconciliation_gaps_total",
            "Partial rider/delivery writes that need repair",
        )
        .expect("valid reconciliation_gaps_total metric");

        let rider_active_deliveries = IntGaugeVec::new(
            Opts::new("rider_active_deliveries", "Deliveries held per rider"),
            &["rider_id"],
        )
        .expect("valid rider_active_deliveries metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(delivery_transitions_total.clone()))
            .expect("register delivery_transitions_total");
        registry
            .register(Box::new(deliveries_expired_total.clone()))
            .expect("register deliveries_expired_total");
        registry
            .register(Box::new(reassignments_total.clone()))
            .expect("register reassignments_total");
        registry
            .register(Box::new(reconciliation_gaps_total.clone()))
            .expect("register reconciliation_gaps_total");
        registry
            .register(Box::new(rider_active_deliveries.clone()))
            .expect("register rider_active_deliveries");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            orders_in_queue,
            delivery_transitions_total,
            deliveries_expired_total,
            reassignments_total,
            reconciliation_gaps_total,
            rider_active_deliveries,
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
