use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatches_total: IntCounterVec,
    pub flight_ticks_total: IntCounterVec,
    pub store_write_failures_total: IntCounter,
    pub drone_busy: IntGauge,
    pub flight_duration_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatches_total = IntCounterVec::new(
            Opts::new("dispatches_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatches_total metric");

        let flight_ticks_total = IntCounterVec::new(
            Opts::new("flight_ticks_total", "Position updates written by phase"),
            &["phase"],
        )
        .expect("valid flight_ticks_total metric");

        let store_write_failures_total = IntCounter::new(
            "store_write_failures_total",
            "Position store writes that failed and were dropped",
        )
        .expect("valid store_write_failures_total metric");

        let drone_busy = IntGauge::new("drone_busy", "1 while a dispatch round trip is in flight")
            .expect("valid drone_busy metric");

        let flight_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "flight_duration_seconds",
                "Wall time of a full dispatch round trip in seconds",
            )
            .buckets(vec![5.0, 10.0, 15.0, 20.0, 30.0, 60.0]),
        )
        .expect("valid flight_duration_seconds metric");

        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("register dispatches_total");
        registry
            .register(Box::new(flight_ticks_total.clone()))
            .expect("register flight_ticks_total");
        registry
            .register(Box::new(store_write_failures_total.clone()))
            .expect("register store_write_failures_total");
        registry
            .register(Box::new(drone_busy.clone()))
            .expect("register drone_busy");
        registry
            .register(Box::new(flight_duration_seconds.clone()))
            .expect("register flight_duration_seconds");

        Self {
            registry,
            dispatches_total,
            flight_ticks_total,
            store_write_failures_total,
            drone_busy,
            flight_duration_seconds,
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
