//! ## nfproxy-engine::engine
//! **Configuration slot and connection table**
//!
//! The current [`FilterConfig`] sits behind an `Arc` that a reload replaces
//! wholesale. A connection binds to the configuration current when its first
//! packet arrives and keeps it until it is closed, so a reload never changes
//! the pipeline or limits under an open stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use nfproxy_config::EngineConfig;
use nfproxy_core::context::StreamContext;
use nfproxy_core::decision::Decision;
use nfproxy_core::error::{ConfigurationError, DispatchError};
use nfproxy_core::packet::{ConnectionId, RawPacket};
use nfproxy_core::registry::ProtocolRegistry;
use nfproxy_pipeline::compile::{Compiler, FilterConfig};
use nfproxy_pipeline::namespace::Namespace;
use nfproxy_script::Script;
use nfproxy_telemetry::{EventLogger, MetricsRecorder};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

struct Connection {
    config: Arc<FilterConfig>,
    ctx: StreamContext,
}

pub struct Engine {
    registry: Arc<dyn ProtocolRegistry>,
    config: EngineConfig,
    current: RwLock<Arc<FilterConfig>>,
    connections: Mutex<HashMap<ConnectionId, Arc<Mutex<Connection>>>>,
    metrics: MetricsRecorder,
}

impl Engine {
    /// Starts with a pass-through configuration until a script is loaded.
    pub fn new(
        registry: Arc<dyn ProtocolRegistry>,
        config: EngineConfig,
        metrics: MetricsRecorder,
    ) -> Self {
        let passthrough = FilterConfig::passthrough(config.protocol.clone(), config.limits());
        Self {
            registry,
            config,
            current: RwLock::new(Arc::new(passthrough)),
            connections: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    pub fn current(&self) -> Arc<FilterConfig> {
        self.current.read().clone()
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn registry(&self) -> &dyn ProtocolRegistry {
        self.registry.as_ref()
    }

    /// Compiles `enabled` from `namespace` for `protocol` and makes it current.
    /// On error the configuration in service is left untouched.
    #[instrument(level = "info", skip(self, namespace, enabled))]
    pub fn load<S: AsRef<str>>(
        &self,
        namespace: &Namespace,
        enabled: &[S],
        protocol: &str,
    ) -> Result<Arc<FilterConfig>, ConfigurationError> {
        let compiled = Compiler::new(self.registry.as_ref(), self.config.limits())
            .compile(namespace, protocol, enabled);

        match compiled {
            Ok(config) => {
                *self.current.write() = config.clone();
                self.metrics.record_compile(true);
                info!(
                    handlers = ?config.pipeline().names(),
                    stream_max_size = config.limits().stream_max_size,
                    "filter configuration loaded"
                );
                Ok(config)
            }
            Err(err) => {
                self.metrics.record_compile(false);
                error!(%err, "filter configuration rejected, keeping previous");
                Err(err)
            }
        }
    }

    /// Loads a parsed script. The protocol is taken from `protocol`, then
    /// the script, then the engine configuration.
    pub fn load_script(
        &self,
        script: &Script,
        protocol: Option<&str>,
    ) -> Result<Arc<FilterConfig>, ConfigurationError> {
        let protocol = protocol
            .or(script.protocol())
            .unwrap_or(self.config.protocol.as_str())
            .to_string();
        self.load(&script.load(), &script.enabled(), &protocol)
    }

    /// Dispatches one packet of `id`, creating the connection on first sight.
    pub fn handle_packet(
        &self,
        id: ConnectionId,
        packet: RawPacket,
    ) -> Result<Decision, DispatchError> {
        let connection = self.connection(id);
        let mut connection = connection.lock();
        let Connection { config, ctx } = &mut *connection;

        let started = Instant::now();
        match config.dispatch(ctx, packet) {
            Ok(decision) => {
                self.metrics.record_decision(&decision, started.elapsed());
                EventLogger::log_decision(&id, &decision);
                Ok(decision)
            }
            Err(err) => {
                self.metrics.record_dispatch_error(started.elapsed());
                warn!(connection = %id, %err, "dispatch failed");
                Err(err)
            }
        }
    }

    /// Discards the stream state of `id`. Returns whether it was tracked.
    pub fn close_connection(&self, id: &ConnectionId) -> bool {
        let mut table = self.connections.lock();
        let removed = table.remove(id).is_some();
        self.metrics.set_connections(table.len());
        if removed {
            debug!(connection = %id, "connection closed");
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    fn connection(&self, id: ConnectionId) -> Arc<Mutex<Connection>> {
        let mut table = self.connections.lock();
        if let Some(connection) = table.get(&id) {
            return connection.clone();
        }

        let config = self.current();
        let connection = Arc::new(Mutex::new(Connection {
            ctx: config.new_context(),
            config,
        }));
        table.insert(id, connection.clone());
        self.metrics.set_connections(table.len());
        debug!(connection = %id, "connection opened");
        connection
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use nfproxy_core::action::{Action, FullStreamAction};
    use nfproxy_core::decision::MAX_STREAM_SIZE_REACHED;
    use nfproxy_protocols::BuiltinProtocols;
    use tracing_test::traced_test;

    use super::*;

    const BLOCK_SECRET: &str = r#"
filters:
  - name: h1
    params: [{ name: pkt, type: RawPacket }]
    rules:
      - { contains: [secret], return: drop }
"#;

    const BLOCK_EVIL: &str = r#"
globals:
  FGEX_STREAM_MAX_SIZE: 100
  FGEX_FULL_STREAM_ACTION: reject
filters:
  - name: evil
    params: [{ name: line, type: TextLine }]
    rules:
      - { contains: [evil], return: reject }
"#;

    fn engine() -> Engine {
        Engine::new(
            Arc::new(BuiltinProtocols::new()),
            EngineConfig::default(),
            MetricsRecorder::new().unwrap(),
        )
    }

    fn conn(port: u16) -> ConnectionId {
        let server: SocketAddr = "192.0.2.1:80".parse().unwrap();
        ConnectionId::new(SocketAddr::from(([198, 51, 100, 7], port)), server)
    }

    fn packet(payload: &'static str) -> RawPacket {
        RawPacket::from_payload(payload)
    }

    #[test]
    fn accepts_everything_before_a_script_is_loaded() {
        let engine = engine();
        let decision = engine.handle_packet(conn(1), packet("secret")).unwrap();
        assert!(decision.is_accept());
        assert_eq!(engine.connection_count(), 1);
    }

    #[test]
    fn forbidden_substring_is_dropped() {
        let engine = engine();
        engine
            .load_script(&Script::parse(BLOCK_SECRET).unwrap(), None)
            .unwrap();

        assert!(engine.handle_packet(conn(1), packet("hello")).unwrap().is_accept());
        assert!(engine.handle_packet(conn(1), packet("world")).unwrap().is_accept());
        assert_eq!(
            engine.handle_packet(conn(1), packet("the secret")).unwrap(),
            Decision::block(Action::Drop, "h1")
        );
        assert_eq!(engine.metrics().decisions.with_label_values(&["drop"]).get(), 1);
        assert_eq!(engine.metrics().packets.get(), 3);
    }

    #[test]
    #[traced_test]
    fn failed_reload_keeps_previous_configuration() {
        let engine = engine();
        let script = Script::parse(BLOCK_SECRET).unwrap();
        let before = engine.load_script(&script, None).unwrap();

        let err = engine
            .load(&script.load(), &["h1", "missing"], "tcp")
            .unwrap_err();
        assert_eq!(err, ConfigurationError::FilterNotFound("missing".into()));
        assert!(logs_contain("keeping previous"));

        assert!(Arc::ptr_eq(&before, &engine.current()));
        assert_eq!(
            engine.handle_packet(conn(2), packet("secret")).unwrap(),
            Decision::block(Action::Drop, "h1")
        );
        assert_eq!(engine.metrics().compiles.with_label_values(&["error"]).get(), 1);
    }

    #[test]
    fn connections_keep_the_configuration_they_started_with() {
        let engine = engine();
        engine
            .load_script(&Script::parse(BLOCK_SECRET).unwrap(), None)
            .unwrap();
        assert!(engine.handle_packet(conn(1), packet("hi")).unwrap().is_accept());

        engine
            .load_script(&Script::parse(BLOCK_EVIL).unwrap(), None)
            .unwrap();

        // Old connection still runs h1 under the 1 MiB default.
        assert_eq!(
            engine.handle_packet(conn(1), packet("secret")).unwrap(),
            Decision::block(Action::Drop, "h1")
        );
        // New connection runs the reloaded pipeline.
        assert!(engine.handle_packet(conn(2), packet("secret\n")).unwrap().is_accept());
        assert_eq!(
            engine.handle_packet(conn(2), packet("evil\n")).unwrap(),
            Decision::block(Action::Reject, "evil")
        );

        // Closing forgets the binding.
        assert!(engine.close_connection(&conn(1)));
        assert!(!engine.close_connection(&conn(1)));
        assert!(engine.handle_packet(conn(1), packet("secret\n")).unwrap().is_accept());
    }

    #[test]
    fn overflow_under_reject_policy() {
        let engine = engine();
        let config = engine
            .load_script(&Script::parse(BLOCK_EVIL).unwrap(), None)
            .unwrap();
        assert_eq!(config.limits().full_stream_action, FullStreamAction::Reject);

        let first = "x".repeat(100);
        assert!(engine
            .handle_packet(conn(3), RawPacket::from_payload(first))
            .unwrap()
            .is_accept());
        let crossing = engine.handle_packet(conn(3), packet("y")).unwrap();
        assert_eq!(crossing.action, Action::Reject);
        assert_eq!(crossing.matched_by.as_deref(), Some(MAX_STREAM_SIZE_REACHED));
    }

    #[test]
    fn dispatch_errors_are_counted() {
        let engine = engine();
        let script = Script::parse(
            r#"
filters:
  - name: broken
    params: [{ name: pkt, type: RawPacket }]
    rules:
      - { always: true, return: 7 }
"#,
        )
        .unwrap();
        engine.load_script(&script, Some("tcp")).unwrap();
        assert!(matches!(
            engine.handle_packet(conn(4), packet("x")),
            Err(DispatchError::InvalidFilterResult { .. })
        ));
        assert_eq!(engine.metrics().dispatch_errors.get(), 1);
    }
}
