//! Raw packets and connection identity as delivered by the interception layer.

use std::fmt;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("L4 payload size {l4_size} exceeds packet length {len}")]
    PayloadOutOfBounds { l4_size: usize, len: usize },
}

/// One packet as seen on the wire: L3 and L4 headers followed by the payload.
///
/// The headers are opaque to the engine. Filters read and rewrite the
/// payload only; the interception layer fixes lengths and checksums when it
/// forwards a mangled packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawPacket {
    raw: Bytes,
    header_len: usize,
    is_input: bool,
    is_ipv6: bool,
    is_tcp: bool,
}

impl RawPacket {
    /// Wraps a full packet whose last `l4_size` bytes are the L4 payload.
    pub fn new(raw: impl Into<Bytes>, l4_size: usize) -> Result<Self, PacketError> {
        let raw = raw.into();
        if l4_size > raw.len() {
            return Err(PacketError::PayloadOutOfBounds {
                l4_size,
                len: raw.len(),
            });
        }
        Ok(Self {
            header_len: raw.len() - l4_size,
            raw,
            is_input: true,
            is_ipv6: false,
            is_tcp: true,
        })
    }

    /// Builds a header-less inbound TCP packet carrying only `payload`.
    pub fn from_payload(payload: impl Into<Bytes>) -> Self {
        Self {
            raw: payload.into(),
            header_len: 0,
            is_input: true,
            is_ipv6: false,
            is_tcp: true,
        }
    }

    /// Client to server when `true`.
    pub fn with_direction(mut self, is_input: bool) -> Self {
        self.is_input = is_input;
        self
    }

    pub fn with_ipv6(mut self, is_ipv6: bool) -> Self {
        self.is_ipv6 = is_ipv6;
        self
    }

    pub fn with_tcp(mut self, is_tcp: bool) -> Self {
        self.is_tcp = is_tcp;
        self
    }

    /// The full packet bytes, including any rewrite done by a filter.
    #[inline]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// The L4 payload.
    #[inline]
    pub fn payload(&self) -> Bytes {
        self.raw.slice(self.header_len..)
    }

    #[inline]
    pub fn l4_size(&self) -> usize {
        self.raw.len() - self.header_len
    }

    /// Replaces the L4 payload, keeping the headers in front of it.
    pub fn set_payload(&mut self, payload: &[u8]) {
        let mut buf = BytesMut::with_capacity(self.header_len + payload.len());
        buf.extend_from_slice(&self.raw[..self.header_len]);
        buf.extend_from_slice(payload);
        self.raw = buf.freeze();
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.is_input
    }

    #[inline]
    pub fn is_ipv6(&self) -> bool {
        self.is_ipv6
    }

    #[inline]
    pub fn is_tcp(&self) -> bool {
        self.is_tcp
    }
}

/// Identity of one intercepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId {
    pub client: SocketAddr,
    pub server: SocketAddr,
}

impl ConnectionId {
    pub fn new(client: SocketAddr, server: SocketAddr) -> Self {
        Self { client, server }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.client, self.server)
    }
}
