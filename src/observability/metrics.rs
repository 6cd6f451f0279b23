use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub offer_responses_total: IntCounterVec,
    pub dispatch_resolutions_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub active_dispatches: IntGauge,
    pub online_drivers: IntGauge,
    pub open_connections: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("dispatch_offers_total", "Offers sent to drivers by delivery outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_offers_total metric");

        let offer_responses_total = IntCounterVec::new(
            Opts::new(
                "dispatch_offer_responses_total",
                "How outstanding offers were settled",
            ),
            &["response"],
        )
        .expect("valid dispatch_offer_responses_total metric");

        let dispatch_resolutions_total = IntCounterVec::new(
            Opts::new(
                "dispatch_resolutions_total",
                "Finished dispatch requests by outcome",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_resolutions_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Time from dispatch start to resolution in seconds",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let active_dispatches =
            IntGauge::new("active_dispatches", "Dispatch attempts currently in progress")
                .expect("valid active_dispatches metric");

        let online_drivers = IntGauge::new("online_drivers", "Drivers currently online")
            .expect("valid online_drivers metric");

        let open_connections =
            IntGauge::new("open_connections", "Authenticated real-time connections")
                .expect("valid open_connections metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register dispatch_offers_total");
        registry
            .register(Box::new(offer_responses_total.clone()))
            .expect("register dispatch_offer_responses_total");
        registry
            .register(Box::new(dispatch_resolutions_total.clone()))
            .expect("register dispatch_resolutions_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(active_dispatches.clone()))
            .expect("register active_dispatches");
        registry
            .register(Box::new(online_drivers.clone()))
            .expect("register online_drivers");
        registry
            .register(Box::new(open_connections.clone()))
            .expect("register open_connections");

        Self {
            registry,
            offers_total,
            offer_responses_total,
            dispatch_resolutions_total,
            dispatch_latency_seconds,
            active_dispatches,
            online_drivers,
            open_connections,
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
