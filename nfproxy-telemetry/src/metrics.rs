//! ## nfproxy-telemetry::metrics
//! **Prometheus counters for dispatch and compile activity**

use std::time::Duration;

use nfproxy_core::decision::Decision;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets: IntCounter,
    pub decisions: IntCounterVec,
    pub dispatch_errors: IntCounter,
    pub compiles: IntCounterVec,
    pub connections: IntGauge,
    pub dispatch_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let packets = IntCounter::new("nfproxy_packets_total", "Packets dispatched")?;
        let decisions = IntCounterVec::new(
            Opts::new("nfproxy_decisions_total", "Dispatch decisions by action"),
            &["action"],
        )?;
        let dispatch_errors = IntCounter::new(
            "nfproxy_dispatch_errors_total",
            "Dispatches that ended with an invalid filter result",
        )?;
        let compiles = IntCounterVec::new(
            Opts::new("nfproxy_compiles_total", "Filter script compiles by outcome"),
            &["outcome"],
        )?;
        let connections = IntGauge::new("nfproxy_connections", "Tracked connections")?;
        let dispatch_latency = Histogram::with_opts(
            HistogramOpts::new("nfproxy_dispatch_latency_seconds", "Time spent in one dispatch")
                .buckets(vec![1e-6, 1e-5, 1e-4, 1e-3, 1e-2]),
        )?;

        registry.register(Box::new(packets.clone()))?;
        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(dispatch_errors.clone()))?;
        registry.register(Box::new(compiles.clone()))?;
        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(dispatch_latency.clone()))?;

        Ok(Self {
            registry,
            packets,
            decisions,
            dispatch_errors,
            compiles,
            connections,
            dispatch_latency,
        })
    }

    pub fn record_decision(&self, decision: &Decision, elapsed: Duration) {
        self.packets.inc();
        self.decisions
            .with_label_values(&[decision.action.as_str()])
            .inc();
        self.dispatch_latency.observe(elapsed.as_secs_f64());
    }

    pub fn record_dispatch_error(&self, elapsed: Duration) {
        self.packets.inc();
        self.dispatch_errors.inc();
        self.dispatch_latency.observe(elapsed.as_secs_f64());
    }

    pub fn record_compile(&self, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.compiles.with_label_values(&[outcome]).inc();
    }

    pub fn set_connections(&self, count: usize) {
        self.connections.set(count as i64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfproxy_core::action::Action;

    #[test]
    fn decisions_are_counted_by_action() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_decision(&Decision::accept(), Duration::from_micros(3));
        metrics.record_decision(&Decision::block(Action::Drop, "h"), Duration::from_micros(5));
        metrics.record_decision(&Decision::block(Action::Drop, "h"), Duration::from_micros(5));
        metrics.record_dispatch_error(Duration::from_micros(1));

        assert_eq!(metrics.packets.get(), 4);
        assert_eq!(metrics.decisions.with_label_values(&["drop"]).get(), 2);
        assert_eq!(metrics.decisions.with_label_values(&["accept"]).get(), 1);
        assert_eq!(metrics.dispatch_errors.get(), 1);
    }

    #[test]
    fn text_exposition() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.record_compile(true);
        metrics.record_compile(false);
        metrics.set_connections(3);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("nfproxy_compiles_total{outcome=\"ok\"} 1"));
        assert!(text.contains("nfproxy_compiles_total{outcome=\"error\"} 1"));
        assert!(text.contains("nfproxy_connections 3"));
    }
}
