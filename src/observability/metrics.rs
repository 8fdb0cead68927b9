use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub order_transitions_total: IntCounterVec,
    pub tracking_points_total: IntCounter,
    pub truck_assignments_total: IntCounterVec,
    pub active_sessions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total orders created by customers")
                .expect("valid orders_created_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let tracking_points_total =
            IntCounter::new("tracking_points_total", "Tracking points appended or seeded")
                .expect("valid tracking_points_total metric");

        let truck_assignments_total = IntCounterVec::new(
            Opts::new(
                "truck_assignments_total",
                "Truck auto-assignment attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid truck_assignments_total metric");

        let active_sessions = IntGauge::new("active_sessions", "Currently valid session tokens")
            .expect("valid active_sessions metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(tracking_points_total.clone()))
            .expect("register tracking_points_total");
        registry
            .register(Box::new(truck_assignments_total.clone()))
            .expect("register truck_assignments_total");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("register active_sessions");

        Self {
            registry,
            orders_created_total,
            order_transitions_total,
            tracking_points_total,
            truck_assignments_total,
            active_sessions,
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
