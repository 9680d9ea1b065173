//! ## nfproxy-telemetry::logging
//! **Structured logging with tracing**
//!
//! `RUST_LOG` wins over the configured level when set.

use nfproxy_core::decision::Decision;
use nfproxy_core::packet::ConnectionId;
use tracing::{debug, info, info_span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global fmt subscriber. Fails if one is already set.
    pub fn init(default_level: &str) -> Result<(), TryInitError> {
        use tracing_subscriber::util::SubscriberInitExt;

        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_thread_names(true)
            .with_span_events(FmtSpan::ENTER)
            .finish()
            .try_init()
    }

    /// Accepts go to debug, everything else to info.
    #[inline]
    pub fn log_decision(connection: &ConnectionId, decision: &Decision) {
        let span = info_span!("decision", connection = %connection);
        let _entered = span.enter();

        if decision.is_accept() {
            debug!("packet accepted");
        } else {
            info!(
                action = %decision.action,
                matched_by = decision.matched_by.as_deref().unwrap_or("-"),
                mangled_len = decision.mangled_bytes.as_ref().map(|b| b.len()),
                "packet verdict"
            );
        }
    }
}
