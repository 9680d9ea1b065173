//! ## nfproxy-protocols::http
//! HTTP/1.x message reassembly on top of a TCP stream.
//!
//! Requests are read from the client direction, responses from the server
//! direction. A message is handed out once its head and its body are
//! complete. The body is framed by `Content-Length` or chunked transfer
//! coding; a message with neither has an empty body.
//!
//! A malformed message makes the stream unrecoverable: the extractor ends the
//! dispatch with a reject attributed to the requesting handler.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use nom::{
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    combinator::recognize,
    multi::many0,
    IResult, Parser,
};
use thiserror::Error;
use tracing::debug;

use nfproxy_core::context::StreamContext;
use nfproxy_core::datatype::{DataType, DataValue, HttpHead, HttpMessage};
use nfproxy_core::extract::{Extracted, Terminal, TerminalAction};
use nfproxy_core::registry::ProtocolSpec;

use crate::stream::{gathered, Directions, Fill, PacketView, Reassembly};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HttpParseError {
    /// More bytes are needed to complete the message.
    #[error("Incomplete HTTP message")]
    Incomplete,
    #[error("Malformed HTTP message: {0}")]
    Malformed(&'static str),
}

/// Unconsumed bytes per direction: requests inbound, responses outbound.
#[derive(Debug, Default)]
struct HttpStreams(Directions);

pub fn spec() -> ProtocolSpec {
    ProtocolSpec::new("http")
        .with(DataType::RawPacket, crate::raw_packet)
        .with_buffered(DataType::HttpRequest, request, feed_requests)
        .with_buffered(DataType::HttpResponse, response, feed_responses)
}

fn feed_requests(ctx: &mut StreamContext) {
    buffer(ctx, true);
}

fn feed_responses(ctx: &mut StreamContext) {
    buffer(ctx, false);
}

/// Feeds and returns the buffer of `inbound`'s direction; `None` when the
/// packet does not belong to it.
fn buffer(ctx: &mut StreamContext, inbound: bool) -> Option<&mut Reassembly> {
    let view = PacketView::of(ctx);
    if !view.tcp || view.inbound != inbound {
        return None;
    }
    let buf = ctx.state_mut::<HttpStreams>().0.get(inbound);
    buf.ingest(view.seq, &view.payload, view.limits);
    Some(buf)
}

fn request(ctx: &mut StreamContext) -> Extracted {
    message(ctx, true)
}

fn response(ctx: &mut StreamContext) -> Extracted {
    message(ctx, false)
}

/// Every message completed so far in one direction, oldest first.
fn message(ctx: &mut StreamContext, inbound: bool) -> Extracted {
    let Some(buf) = buffer(ctx, inbound) else {
        return Extracted::NotReady;
    };
    match buf.fill() {
        Fill::Full(terminal) => return Extracted::Terminal(terminal),
        Fill::Flushed => return Extracted::NotReady,
        Fill::Kept => {}
    }

    let parser = HttpParser::new();
    let mut messages = Vec::new();
    loop {
        let parsed = if inbound {
            parser.parse_request(buf.bytes())
        } else {
            parser.parse_response(buf.bytes())
        };
        match parsed {
            Ok((msg, used)) => {
                buf.consume(used);
                messages.push(DataValue::Http(Arc::new(msg)));
            }
            Err(HttpParseError::Incomplete) => break,
            Err(HttpParseError::Malformed(reason)) => {
                debug!(reason, inbound, "malformed http message");
                buf.clear();
                return Extracted::Terminal(Terminal::protocol(TerminalAction::Reject));
            }
        }
    }
    gathered(messages)
}

/// Parser for one HTTP/1.x message at the start of a buffer.
#[derive(Default, Debug, Copy, Clone)]
pub struct HttpParser;

impl HttpParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a request. Returns the message and the number of bytes it spans.
    pub fn parse_request(&self, data: &[u8]) -> Result<(HttpMessage, usize), HttpParseError> {
        let head_len = head_length(data)?;
        let (rest, ((method, url, version), headers)) = (request_line, many0(header_line))
            .parse(&data[..head_len])
            .map_err(|_| HttpParseError::Malformed("invalid request head"))?;
        if !rest.is_empty() {
            return Err(HttpParseError::Malformed("invalid header line"));
        }
        let head = HttpHead::Request {
            method: ascii(method),
            url: ascii(url),
        };
        assemble(head, version, headers, data, head_len)
    }

    /// Parses a response. Returns the message and the number of bytes it spans.
    pub fn parse_response(&self, data: &[u8]) -> Result<(HttpMessage, usize), HttpParseError> {
        let head_len = head_length(data)?;
        let (rest, ((version, status, reason), headers)) = (status_line, many0(header_line))
            .parse(&data[..head_len])
            .map_err(|_| HttpParseError::Malformed("invalid response head"))?;
        if !rest.is_empty() {
            return Err(HttpParseError::Malformed("invalid header line"));
        }
        let status = ascii(status)
            .parse::<u16>()
            .map_err(|_| HttpParseError::Malformed("invalid status code"))?;
        let head = HttpHead::Response {
            status,
            reason: String::from_utf8_lossy(reason).into_owned(),
        };
        assemble(head, version, headers, data, head_len)
    }
}

type RawHeader<'a> = (&'a [u8], &'a [u8]);

fn assemble(
    head: HttpHead,
    version: &[u8],
    raw_headers: Vec<RawHeader<'_>>,
    data: &[u8],
    head_len: usize,
) -> Result<(HttpMessage, usize), HttpParseError> {
    let headers: Vec<(String, String)> = raw_headers
        .into_iter()
        .map(|(name, value)| {
            (
                ascii(name),
                String::from_utf8_lossy(value).trim_end().to_string(),
            )
        })
        .collect();

    let mut msg = HttpMessage {
        head,
        version: ascii(version),
        headers,
        body: Bytes::new(),
    };
    let body_data = &data[head_len + 2..];

    let chunked = msg
        .header("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    let used = if chunked {
        let (body, used) = dechunk(body_data)?;
        msg.body = body;
        used
    } else if let Some(len) = msg.header("content-length") {
        let len = len
            .trim()
            .parse::<usize>()
            .map_err(|_| HttpParseError::Malformed("invalid content-length"))?;
        if body_data.len() < len {
            return Err(HttpParseError::Incomplete);
        }
        msg.body = Bytes::copy_from_slice(&body_data[..len]);
        len
    } else {
        0
    };
    Ok((msg, head_len + 2 + used))
}

/// Length of the head up to and including the CRLF of its last header line.
fn head_length(data: &[u8]) -> Result<usize, HttpParseError> {
    data.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 2)
        .ok_or(HttpParseError::Incomplete)
}

/// Decodes a chunked body. Returns the body and the bytes consumed, trailers included.
fn dechunk(data: &[u8]) -> Result<(Bytes, usize), HttpParseError> {
    let mut body = BytesMut::new();
    let mut pos = 0;
    loop {
        let line_end = find_crlf(&data[pos..]).ok_or(HttpParseError::Incomplete)?;
        let size_field = &data[pos..pos + line_end];
        let size_hex = size_field.split(|&b| b == b';').next().unwrap_or_default();
        let size = usize::from_str_radix(ascii(size_hex).trim(), 16)
            .map_err(|_| HttpParseError::Malformed("invalid chunk size"))?;
        pos += line_end + 2;

        if size == 0 {
            // Trailer section ends with an empty line.
            loop {
                let line_end = find_crlf(&data[pos..]).ok_or(HttpParseError::Incomplete)?;
                pos += line_end + 2;
                if line_end == 0 {
                    return Ok((body.freeze(), pos));
                }
            }
        }

        let chunk_end = pos
            .checked_add(size)
            .filter(|end| end.checked_add(2).is_some())
            .ok_or(HttpParseError::Malformed("chunk size too large"))?;
        if data.len() < chunk_end + 2 {
            return Err(HttpParseError::Incomplete);
        }
        body.extend_from_slice(&data[pos..chunk_end]);
        if &data[chunk_end..chunk_end + 2] != b"\r\n" {
            return Err(HttpParseError::Malformed("chunk not terminated by CRLF"));
        }
        pos = chunk_end + 2;
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn ascii(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_token(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
}

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

fn http_version(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize((
        tag(&b"HTTP/"[..]),
        take_while1(|c: u8| c.is_ascii_digit() || c == b'.'),
    ))
    .parse(input)
}

fn request_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, method) = take_while1(is_token).parse(input)?;
    let (input, _) = tag(&b" "[..]).parse(input)?;
    let (input, url) = take_while1(|c: u8| c > b' ' && c != 0x7f).parse(input)?;
    let (input, _) = tag(&b" "[..]).parse(input)?;
    let (input, version) = http_version(input)?;
    let (input, _) = tag(&b"\r\n"[..]).parse(input)?;
    Ok((input, (method, url, version)))
}

fn status_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
    let (input, version) = http_version(input)?;
    let (input, _) = tag(&b" "[..]).parse(input)?;
    let (input, status) = take_while_m_n(3, 3, |c: u8| c.is_ascii_digit()).parse(input)?;
    let (input, _) = take_while(is_space).parse(input)?;
    let (input, reason) = take_while(|c: u8| c != b'\r' && c != b'\n').parse(input)?;
    let (input, _) = tag(&b"\r\n"[..]).parse(input)?;
    Ok((input, (version, status, reason)))
}

fn header_line(input: &[u8]) -> IResult<&[u8], RawHeader<'_>> {
    let (input, name) = take_while1(is_token).parse(input)?;
    let (input, _) = tag(&b":"[..]).parse(input)?;
    let (input, _) = take_while(is_space).parse(input)?;
    let (input, value) = take_while(|c: u8| c != b'\r' && c != b'\n').parse(input)?;
    let (input, _) = tag(&b"\r\n"[..]).parse(input)?;
    Ok((input, (name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfproxy_core::action::FullStreamAction;
    use nfproxy_core::context::StreamLimits;
    use nfproxy_core::packet::RawPacket;

    #[test]
    fn parses_request_with_content_length() {
        let data = b"POST /login HTTP/1.1\r\nHost: example.org\r\nContent-Length: 5\r\n\r\nhelloEXTRA";
        let (msg, used) = HttpParser::new().parse_request(data).unwrap();
        assert_eq!(msg.method(), Some("POST"));
        assert_eq!(msg.url(), Some("/login"));
        assert_eq!(msg.version, "HTTP/1.1");
        assert_eq!(msg.header("host"), Some("example.org"));
        assert_eq!(&msg.body[..], b"hello");
        assert_eq!(&data[used..], b"EXTRA");
    }

    #[test]
    fn parses_response_status() {
        let data = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
        let (msg, used) = HttpParser::new().parse_response(data).unwrap();
        assert_eq!(msg.status(), Some(404));
        assert_eq!(msg.head, HttpHead::Response { status: 404, reason: "Not Found".into() });
        assert_eq!(used, data.len());
    }

    #[test]
    fn incomplete_until_head_and_body_arrive() {
        let parser = HttpParser::new();
        assert_eq!(
            parser.parse_request(b"GET / HTTP/1.1\r\nHost: a\r\n"),
            Err(HttpParseError::Incomplete)
        );
        assert_eq!(
            parser.parse_request(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"),
            Err(HttpParseError::Incomplete)
        );
    }

    #[test]
    fn decodes_chunked_body() {
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n";
        let (msg, used) = HttpParser::new().parse_response(data).unwrap();
        assert_eq!(&msg.body[..], b"Wikipedia");
        assert_eq!(used, data.len());
    }

    #[test]
    fn rejects_oversized_chunk() {
        let data = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab";
        assert_eq!(
            HttpParser::new().parse_request(data),
            Err(HttpParseError::Malformed("chunk size too large"))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            HttpParser::new().parse_request(b"NOT HTTP AT ALL\r\n\r\n"),
            Err(HttpParseError::Malformed("invalid request head"))
        );
        assert_eq!(
            HttpParser::new().parse_request(b"GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n"),
            Err(HttpParseError::Malformed("invalid content-length"))
        );
    }

    fn ctx() -> StreamContext {
        StreamContext::new(StreamLimits {
            stream_max_size: 4096,
            full_stream_action: FullStreamAction::Flush,
        })
    }

    #[test]
    fn extractor_reassembles_across_packets() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload("GET /a HTTP/1.1\r\nHo"));
        assert_eq!(request(&mut ctx), Extracted::NotReady);

        ctx.begin_packet(RawPacket::from_payload("st: x\r\n\r\nGET /b"));
        match request(&mut ctx) {
            Extracted::Value(DataValue::Http(msg)) => assert_eq!(msg.url(), Some("/a")),
            other => panic!("unexpected {other:?}"),
        }

        ctx.begin_packet(RawPacket::from_payload(" HTTP/1.1\r\n\r\n"));
        match request(&mut ctx) {
            Extracted::Value(DataValue::Http(msg)) => assert_eq!(msg.url(), Some("/b")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extractor_rejects_malformed_stream() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload("\x01\x02 junk\r\n\r\n"));
        assert_eq!(
            request(&mut ctx),
            Extracted::Terminal(Terminal::protocol(TerminalAction::Reject))
        );
    }

    #[test]
    fn malformed_message_does_not_poison_later_packets() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload(
            "POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nab",
        ));
        assert_eq!(
            request(&mut ctx),
            Extracted::Terminal(Terminal::protocol(TerminalAction::Reject))
        );

        ctx.begin_packet(RawPacket::from_payload("GET / HTTP/1.1\r\n\r\n"));
        match request(&mut ctx) {
            Extracted::Value(DataValue::Http(msg)) => assert_eq!(msg.url(), Some("/")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipelined_requests_are_all_returned() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload(
            "GET / HTTP/1.1\r\nHost: a\r\n\r\nGET /admin HTTP/1.1\r\nHost: a\r\n\r\n",
        ));
        let Extracted::Values(values) = request(&mut ctx) else {
            panic!("expected both requests");
        };
        let urls: Vec<_> = values
            .iter()
            .map(|value| match value {
                DataValue::Http(msg) => msg.url().map(str::to_owned),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(urls, [Some("/".to_owned()), Some("/admin".to_owned())]);
    }

    #[test]
    fn feed_buffers_requests_before_extraction() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload("GET /late HTTP/1.1\r\n"));
        feed_requests(&mut ctx);
        ctx.begin_packet(RawPacket::from_payload("\r\n"));
        match request(&mut ctx) {
            Extracted::Value(DataValue::Http(msg)) => assert_eq!(msg.url(), Some("/late")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn response_extractor_ignores_client_packets() {
        let mut ctx = ctx();
        ctx.begin_packet(RawPacket::from_payload("HTTP/1.1 200 OK\r\n\r\n"));
        assert_eq!(response(&mut ctx), Extracted::NotReady);
    }
}
