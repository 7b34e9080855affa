use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub donations_created_total: IntCounter,
    pub donations_expired_total: IntCounter,
    pub requests_total: IntCounterVec,
    pub route_plans_total: IntCounter,
    pub route_plan_stops: Histogram,
    pub event_subscribers: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let donations_created_total =
            IntCounter::new("donations_created_total", "Total donations posted")
                .expect("valid donations_created_total metric");

        let donations_expired_total = IntCounter::new(
            "donations_expired_total",
            "Donations marked expired by the sweeper",
        )
        .expect("valid donations_expired_total metric");

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Request status changes by resulting status"),
            &["status"],
        )
        .expect("valid requests_total metric");

        let route_plans_total = IntCounter::new("route_plans_total", "Route plans computed")
            .expect("valid route_plans_total metric");

        let route_plan_stops = Histogram::with_opts(
            HistogramOpts::new("route_plan_stops", "Stops per computed route plan")
                .buckets(vec![0.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )
        .expect("valid route_plan_stops metric");

        let event_subscribers =
            IntGauge::new("event_subscribers", "Connected event stream clients")
                .expect("valid event_subscribers metric");

        registry
            .register(Box::new(donations_created_total.clone()))
            .expect("register donations_created_total");
        registry
            .register(Box::new(donations_expired_total.clone()))
            .expect("register donations_expired_total");
        registry
            .register(Box::new(requests_total.clone()))
            .expect("register requests_total");
        registry
            .register(Box::new(route_plans_total.clone()))
            .expect("register route_plans_total");
        registry
            .register(Box::new(route_plan_stops.clone()))
            .expect("register route_plan_stops");
        registry
            .register(Box::new(event_subscribers.clone()))
            .expect("register event_subscribers");

        Self {
            registry,
            donations_created_total,
            donations_expired_total,
            requests_total,
            route_plans_total,
            route_plan_stops,
            event_subscribers,
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
