//! ## nfproxy-protocols::tcp
//! Extractors for plain TCP streams: per-direction stream reconstruction and
//! line framing.

use bytes::Bytes;
use nfproxy_core::context::StreamContext;
use nfproxy_core::datatype::{DataType, DataValue};
use nfproxy_core::extract::Extracted;
use nfproxy_core::registry::ProtocolSpec;

use crate::stream::{gathered, Directions, Fill, PacketView, Reassembly};

/// Reconstructed bytes of both directions.
#[derive(Debug, Default)]
struct TcpStreams(Directions);

/// Unconsumed bytes waiting for a line terminator, per direction.
#[derive(Debug, Default)]
struct LineBuffers(Directions);

pub fn spec() -> ProtocolSpec {
    ProtocolSpec::new("tcp")
        .with(DataType::RawPacket, crate::raw_packet)
        .with_buffered(DataType::TcpInputStream, input_stream, feed_input)
        .with_buffered(DataType::TcpOutputStream, output_stream, feed_output)
        .with_buffered(DataType::TextLine, text_line, feed_lines)
}

fn feed_input(ctx: &mut StreamContext) {
    stream_buffer(ctx, true);
}

fn feed_output(ctx: &mut StreamContext) {
    stream_buffer(ctx, false);
}

fn feed_lines(ctx: &mut StreamContext) {
    line_buffer(ctx);
}

/// Feeds and returns the stream buffer of `inbound`'s direction; `None` when
/// the packet does not belong to it.
fn stream_buffer(ctx: &mut StreamContext, inbound: bool) -> Option<&mut Reassembly> {
    let view = PacketView::of(ctx);
    if !view.tcp || view.inbound != inbound {
        return None;
    }
    let buf = ctx.state_mut::<TcpStreams>().0.get(inbound);
    buf.ingest(view.seq, &view.payload, view.limits);
    Some(buf)
}

/// Feeds and returns the line buffer of the packet's direction.
fn line_buffer(ctx: &mut StreamContext) -> Option<&mut Reassembly> {
    let view = PacketView::of(ctx);
    if !view.tcp {
        return None;
    }
    let buf = ctx.state_mut::<LineBuffers>().0.get(view.inbound);
    buf.ingest(view.seq, &view.payload, view.limits);
    Some(buf)
}

fn input_stream(ctx: &mut StreamContext) -> Extracted {
    stream(ctx, true)
}

fn output_stream(ctx: &mut StreamContext) -> Extracted {
    stream(ctx, false)
}

fn stream(ctx: &mut StreamContext, inbound: bool) -> Extracted {
    let Some(buf) = stream_buffer(ctx, inbound) else {
        return Extracted::NotReady;
    };
    match buf.fill() {
        Fill::Full(terminal) => Extracted::Terminal(terminal),
        Fill::Flushed => Extracted::NotReady,
        Fill::Kept if buf.is_empty() => Extracted::NotReady,
        Fill::Kept => Extracted::Value(DataValue::Stream(buf.bytes().clone())),
    }
}

/// Every line completed so far in the packet's direction, oldest first.
fn text_line(ctx: &mut StreamContext) -> Extracted {
    let Some(buf) = line_buffer(ctx) else {
        return Extracted::NotReady;
    };
    match buf.fill() {
        Fill::Full(terminal) => Extracted::Terminal(terminal),
        Fill::Flushed => Extracted::NotReady,
        Fill::Kept => {
            let lines = std::iter::from_fn(|| take_line(buf))
                .map(DataValue::Line)
                .collect();
            gathered(lines)
        }
    }
}

/// Splits off the earliest `\n`-terminated line, without `\n` or a trailing `\r`.
fn take_line(buf: &mut Reassembly) -> Option<Bytes> {
    let end = buf.bytes().iter().position(|&b| b == b'\n')?;
    let mut line = buf.take(end + 1);
    line.truncate(end);
    if line.last() == Some(&b'\r') {
        line.truncate(end - 1);
    }
    Some(line)
}
