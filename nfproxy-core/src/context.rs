//! ## nfproxy-core::context
//! **Per-connection mutable state**
//!
//! A [`StreamContext`] lives as long as one intercepted connection. It holds:
//! - the packet currently being dispatched
//! - the per-packet cache of derived values, reset on every dispatch
//! - the stream limits and overflow policy of the configuration it was created for
//! - protocol-owned reconstruction state, opaque to the core
//!
//! The context is not safe for concurrent mutation. Callers dispatch at most
//! one packet per connection at a time, in arrival order.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::FullStreamAction;
use crate::datatype::{DataType, DataValue};
use crate::extract::{Terminal, TerminalAction};
use crate::packet::RawPacket;

/// Fallback for `stream_max_size` when a script does not set a usable one (1 MiB).
pub const DEFAULT_STREAM_MAX_SIZE: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLimits {
    /// Largest reconstruction buffer tolerated, in bytes.
    pub stream_max_size: usize,
    pub full_stream_action: FullStreamAction,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            stream_max_size: DEFAULT_STREAM_MAX_SIZE,
            full_stream_action: FullStreamAction::Flush,
        }
    }
}

/// Outcome of checking a buffer against [`StreamLimits`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    Within,
    /// Over the limit under FLUSH: the caller clears the buffer.
    Flush,
    /// Over the limit under DROP or REJECT.
    Terminal(Terminal),
}

impl StreamLimits {
    pub fn check(&self, buffered: usize) -> Overflow {
        if buffered <= self.stream_max_size {
            return Overflow::Within;
        }
        match self.full_stream_action {
            FullStreamAction::Flush => Overflow::Flush,
            FullStreamAction::Drop => Overflow::Terminal(Terminal::stream_full(TerminalAction::Drop)),
            FullStreamAction::Reject => {
                Overflow::Terminal(Terminal::stream_full(TerminalAction::Reject))
            }
        }
    }
}

/// What the per-packet cache knows about a tag.
#[derive(Debug, PartialEq, Eq)]
pub enum Cached<'a> {
    /// Not requested yet during this dispatch.
    Missing,
    /// Requested, and the extractor reported it not ready.
    Unavailable,
    /// One or more values, in stream order.
    Values(&'a [DataValue]),
}

/// Values derived during one dispatch, keyed by tag.
#[derive(Debug, Default)]
pub struct PacketCache {
    entries: HashMap<DataType, Option<Vec<DataValue>>>,
}

impl PacketCache {
    pub fn lookup(&self, tag: DataType) -> Cached<'_> {
        match self.entries.get(&tag) {
            None => Cached::Missing,
            Some(None) => Cached::Unavailable,
            Some(Some(values)) => Cached::Values(values),
        }
    }

    pub fn insert(&mut self, tag: DataType, value: DataValue) {
        self.entries.insert(tag, Some(vec![value]));
    }

    /// Caches every value; an empty list marks the tag unavailable.
    pub fn insert_all(&mut self, tag: DataType, values: Vec<DataValue>) {
        let entry = (!values.is_empty()).then_some(values);
        self.entries.insert(tag, entry);
    }

    pub fn mark_unavailable(&mut self, tag: DataType) {
        self.entries.insert(tag, None);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct StreamContext {
    packet: RawPacket,
    /// Number of packets begun so far; 0 before the first.
    seq: u64,
    cache: PacketCache,
    limits: StreamLimits,
    state: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl StreamContext {
    pub fn new(limits: StreamLimits) -> Self {
        Self {
            packet: RawPacket::default(),
            seq: 0,
            cache: PacketCache::default(),
            limits,
            state: HashMap::new(),
        }
    }

    /// Installs the next packet and resets the per-packet cache, seeding it
    /// with the packet under [`DataType::RawPacket`].
    pub fn begin_packet(&mut self, packet: RawPacket) {
        self.cache.clear();
        self.cache
            .insert(DataType::RawPacket, DataValue::Packet(packet.clone()));
        self.packet = packet;
        self.seq += 1;
    }

    /// Re-seeds [`DataType::RawPacket`] from the current packet after a
    /// filter rewrote it.
    pub fn refresh_packet(&mut self) {
        self.cache
            .insert(DataType::RawPacket, DataValue::Packet(self.packet.clone()));
    }

    #[inline]
    pub fn packet(&self) -> &RawPacket {
        &self.packet
    }

    /// Sequence number of the current packet, starting at 1.
    #[inline]
    pub fn packet_seq(&self) -> u64 {
        self.seq
    }

    /// Mutable access for filters that rewrite the payload.
    #[inline]
    pub fn packet_mut(&mut self) -> &mut RawPacket {
        &mut self.packet
    }

    #[inline]
    pub fn limits(&self) -> StreamLimits {
        self.limits
    }

    #[inline]
    pub fn cache(&self) -> &PacketCache {
        &self.cache
    }

    #[inline]
    pub fn cache_mut(&mut self) -> &mut PacketCache {
        &mut self.cache
    }

    /// Protocol-owned state of type `T`, created on first use.
    pub fn state_mut<T: Default + Send + 'static>(&mut self) -> &mut T {
        self.state
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("state slot keyed by its own TypeId"))
    }

    pub fn state<T: Send + 'static>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref::<T>())
    }

    /// Drops all protocol-owned state, keeping limits.
    pub fn clear_state(&mut self) {
        self.state.clear();
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext")
            .field("packet", &self.packet)
            .field("cache", &self.cache)
            .field("limits", &self.limits)
            .field("state_slots", &self.state.len())
            .finish()
    }
}
