use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub carpool_attempts_total: IntCounterVec,
    pub carpool_attempt_latency_seconds: HistogramVec,
    pub open_groups: IntGauge,
    pub pending_carpool_bookings: IntGauge,
    pub bookings_expired_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let carpool_attempts_total = IntCounterVec::new(
            Opts::new("carpool_attempts_total", "Carpool grouping attempts by outcome"),
            &["outcome"],
        )
        .expect("valid carpool_attempts_total metric");

        let carpool_attempt_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "carpool_attempt_latency_seconds",
                "Latency of carpool grouping attempts in seconds",
            ),
            &["outcome"],
        )
        .expect("valid carpool_attempt_latency_seconds metric");

        let open_groups = IntGauge::new("open_groups", "Carpool groups waiting for a driver")
            .expect("valid open_groups metric");

        let pending_carpool_bookings = IntGauge::new(
            "pending_carpool_bookings",
            "Carpool bookings not yet placed in a group",
        )
        .expect("valid pending_carpool_bookings metric");

        let bookings_expired_total = IntCounter::new(
            "bookings_expired_total",
            "Carpool bookings expired after waiting too long for a group",
        )
        .expect("valid bookings_expired_total metric");

        registry
            .register(Box::new(carpool_attempts_total.clone()))
            .expect("register carpool_attempts_total");
        registry
            .register(Box::new(carpool_attempt_latency_seconds.clone()))
            .expect("register carpool_attempt_latency_seconds");
        registry
            .register(Box::new(open_groups.clone()))
            .expect("register open_groups");
        registry
            .register(Box::new(pending_carpool_bookings.clone()))
            .expect("register pending_carpool_bookings");
        registry
            .register(Box::new(bookings_expired_total.clone()))
            .expect("register bookings_expired_total");

        Self {
            registry,
            carpool_attempts_total,
            carpool_attempt_latency_seconds,
            open_groups,
            pending_carpool_bookings,
            bookings_expired_total,
        }
    }

    /// Records one grouping attempt under `outcome`.
    pub fn observe_attempt(&self, outcome: &str, elapsed_secs: f64) {
        self.carpool_attempt_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
        self.carpool_attempts_total
            .with_label_values(&[outcome])
            .inc();
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
