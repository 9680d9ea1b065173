//! # nfproxy Telemetry
//!
//! Structured logging setup and Prometheus metrics for the engine.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
