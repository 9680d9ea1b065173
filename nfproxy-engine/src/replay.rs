//! ## nfproxy-engine::replay
//! **Offline replay of recorded packets**
//!
//! A trace is a YAML list of packets with their connection and direction:
//!
//! ```yaml
//! packets:
//!   - { client: "10.0.0.1:40000", server: "10.0.0.2:80", payload: "GET / HTTP/1.1\r\n\r\n" }
//!   - { client: "10.0.0.1:40000", server: "10.0.0.2:80", direction: out, payload_hex: "48545450" }
//! ```
//!
//! Each connection is replayed on its own task in trace order; connections
//! run concurrently.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use nfproxy_core::decision::Decision;
use nfproxy_core::error::DispatchError;
use nfproxy_core::packet::{ConnectionId, RawPacket};
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{info, info_span, Instrument};

use crate::engine::Engine;
use crate::error::EngineError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to server.
    #[default]
    In,
    Out,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracePacket {
    pub client: SocketAddr,
    pub server: SocketAddr,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub payload_hex: Option<String>,
}

impl TracePacket {
    pub fn connection(&self) -> ConnectionId {
        ConnectionId::new(self.client, self.server)
    }

    pub fn raw_packet(&self) -> Result<RawPacket, EngineError> {
        let payload = match (&self.payload, &self.payload_hex) {
            (Some(text), None) => text.as_bytes().to_vec(),
            (None, Some(encoded)) => hex::decode(encoded)
                .map_err(|e| EngineError::Trace(format!("bad payload_hex: {e}")))?,
            (None, None) => Vec::new(),
            (Some(_), Some(_)) => {
                return Err(EngineError::Trace(
                    "payload and payload_hex are mutually exclusive".to_string(),
                ))
            }
        };
        Ok(RawPacket::from_payload(payload).with_direction(self.direction == Direction::In))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trace {
    #[serde(default)]
    pub packets: Vec<TracePacket>,
}

impl Trace {
    pub fn parse(source: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
}

/// Outcome of one replayed packet.
#[derive(Debug)]
pub struct ReplayRecord {
    /// Position in the trace.
    pub index: usize,
    pub connection: ConnectionId,
    pub outcome: Result<Decision, DispatchError>,
}

/// Replays `trace` through `engine` and returns one record per packet, in
/// trace order. Connections are closed once their packets are replayed.
pub async fn replay(engine: Arc<Engine>, trace: Trace) -> Result<Vec<ReplayRecord>, EngineError> {
    let mut order: HashMap<ConnectionId, usize> = HashMap::new();
    let mut streams: Vec<(ConnectionId, Vec<(usize, RawPacket)>)> = Vec::new();
    for (index, packet) in trace.packets.iter().enumerate() {
        let id = packet.connection();
        let slot = *order.entry(id).or_insert_with(|| {
            streams.push((id, Vec::new()));
            streams.len() - 1
        });
        streams[slot].1.push((index, packet.raw_packet()?));
    }
    info!(packets = trace.packets.len(), connections = streams.len(), "replaying trace");

    let mut tasks = JoinSet::new();
    for (id, packets) in streams {
        let engine = engine.clone();
        tasks.spawn(
            async move {
                let records: Vec<ReplayRecord> = packets
                    .into_iter()
                    .map(|(index, packet)| ReplayRecord {
                        index,
                        connection: id,
                        outcome: engine.handle_packet(id, packet),
                    })
                    .collect();
                engine.close_connection(&id);
                records
            }
            .instrument(info_span!("replay_connection", connection = %id)),
        );
    }

    let mut records = Vec::with_capacity(trace.packets.len());
    while let Some(finished) = tasks.join_next().await {
        records.extend(finished?);
    }
    records.sort_by_key(|record| record.index);
    Ok(records)
}
