//! Reconstruction buffer shared by every buffered extractor.
//!
//! The buffer is fed once per packet, either by the pipeline's feed or by the
//! extractor itself, whichever runs first. Its bytes live in a frozen
//! [`Bytes`] so extractors hand out views without copying; appending turns
//! it back into a [`BytesMut`], which reuses the allocation once those views
//! have been dropped.

use bytes::{Buf, Bytes, BytesMut};
use nfproxy_core::context::{Overflow, StreamContext, StreamLimits};
use nfproxy_core::datatype::DataValue;
use nfproxy_core::extract::{Extracted, Terminal};
use tracing::debug;

/// State of the buffer after the last ingested packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Fill {
    #[default]
    Kept,
    /// The buffer went over the limit under FLUSH and was emptied.
    Flushed,
    /// The buffer went over the limit under DROP or REJECT. Sticky: nothing
    /// is appended afterwards.
    Full(Terminal),
}

#[derive(Debug, Default)]
pub(crate) struct Reassembly {
    data: Bytes,
    fill: Fill,
    /// Sequence number of the last ingested packet.
    seen: u64,
}

impl Reassembly {
    /// Appends the payload of packet `seq` and applies the overflow policy.
    /// A second call for the same packet does nothing.
    pub(crate) fn ingest(&mut self, seq: u64, payload: &[u8], limits: StreamLimits) {
        if seq == self.seen {
            return;
        }
        self.seen = seq;
        if let Fill::Full(_) = self.fill {
            return;
        }

        let mut buf = BytesMut::from(std::mem::take(&mut self.data));
        buf.extend_from_slice(payload);
        self.fill = match limits.check(buf.len()) {
            Overflow::Within => Fill::Kept,
            Overflow::Flush => {
                debug!(
                    buffered = buf.len(),
                    limit = limits.stream_max_size,
                    "stream buffer full, flushing"
                );
                buf.clear();
                Fill::Flushed
            }
            Overflow::Terminal(terminal) => {
                debug!(
                    buffered = buf.len(),
                    limit = limits.stream_max_size,
                    action = ?terminal.action,
                    "stream buffer full"
                );
                buf.clear();
                Fill::Full(terminal)
            }
        };
        self.data = buf.freeze();
    }

    pub(crate) fn fill(&self) -> Fill {
        self.fill
    }

    pub(crate) fn bytes(&self) -> &Bytes {
        &self.data
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drops the first `n` bytes, which the caller has handed out.
    pub(crate) fn consume(&mut self, n: usize) {
        self.data.advance(n);
    }

    /// Splits off the first `n` bytes without copying.
    pub(crate) fn take(&mut self, n: usize) -> Bytes {
        self.data.split_to(n)
    }

    pub(crate) fn clear(&mut self) {
        self.data.clear();
    }
}

/// Reconstruction buffers for both directions of one connection.
#[derive(Debug, Default)]
pub(crate) struct Directions {
    input: Reassembly,
    output: Reassembly,
}

impl Directions {
    pub(crate) fn get(&mut self, inbound: bool) -> &mut Reassembly {
        if inbound {
            &mut self.input
        } else {
            &mut self.output
        }
    }
}

/// Current packet facts a feed needs: sequence, direction, transport and
/// payload.
pub(crate) struct PacketView {
    pub seq: u64,
    pub inbound: bool,
    pub tcp: bool,
    pub payload: Bytes,
    pub limits: StreamLimits,
}

impl PacketView {
    pub(crate) fn of(ctx: &StreamContext) -> Self {
        let pkt = ctx.packet();
        Self {
            seq: ctx.packet_seq(),
            inbound: pkt.is_input(),
            tcp: pkt.is_tcp(),
            payload: pkt.payload(),
            limits: ctx.limits(),
        }
    }
}

/// Wraps the values a packet completed: none is not ready, one is a plain value.
pub(crate) fn gathered(mut values: Vec<DataValue>) -> Extracted {
    match values.len() {
        0 => Extracted::NotReady,
        1 => values.pop().map_or(Extracted::NotReady, Extracted::Value),
        _ => Extracted::Values(values),
    }
}
