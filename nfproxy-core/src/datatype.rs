//! ## nfproxy-core::datatype
//! Data-type tags a filter parameter can request, and the values extractors
//! derive for them.
//!
//! Every parameter of a filter carries exactly one [`DataType`]. The builder
//! resolves the tag against the protocol registry once, so dispatch only
//! performs a lookup.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::packet::RawPacket;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    /// The current packet. Seeded into every dispatch.
    RawPacket,
    /// Client to server bytes reconstructed so far.
    #[serde(rename = "TCPInputStream")]
    TcpInputStream,
    /// Server to client bytes reconstructed so far.
    #[serde(rename = "TCPOutputStream")]
    TcpOutputStream,
    /// Earliest complete line of the current packet's direction.
    TextLine,
    /// A complete HTTP request sent by the client.
    HttpRequest,
    /// A complete HTTP response sent by the server.
    HttpResponse,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::RawPacket,
        DataType::TcpInputStream,
        DataType::TcpOutputStream,
        DataType::TextLine,
        DataType::HttpRequest,
        DataType::HttpResponse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::RawPacket => "RawPacket",
            DataType::TcpInputStream => "TCPInputStream",
            DataType::TcpOutputStream => "TCPOutputStream",
            DataType::TextLine => "TextLine",
            DataType::HttpRequest => "HttpRequest",
            DataType::HttpResponse => "HttpResponse",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or(())
    }
}

/// Start line of an HTTP message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpHead {
    Request { method: String, url: String },
    Response { status: u16, reason: String },
}

/// An HTTP/1.x message reassembled from one direction of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpMessage {
    pub head: HttpHead,
    /// Version token as sent, e.g. `HTTP/1.1`.
    pub version: String,
    /// Header fields in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpMessage {
    /// First header with the given name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        match &self.head {
            HttpHead::Request { method, .. } => Some(method),
            HttpHead::Response { .. } => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.head {
            HttpHead::Request { url, .. } => Some(url),
            HttpHead::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.head {
            HttpHead::Request { .. } => None,
            HttpHead::Response { status, .. } => Some(*status),
        }
    }
}

/// A value derived for one [`DataType`] during a dispatch.
///
/// Cloning is cheap: byte payloads are reference counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataValue {
    Packet(RawPacket),
    Stream(Bytes),
    Line(Bytes),
    Http(Arc<HttpMessage>),
}

impl DataValue {
    /// The bytes a matcher looks at: payload, stream, line or HTTP body.
    pub fn bytes(&self) -> Bytes {
        match self {
            DataValue::Packet(pkt) => pkt.payload(),
            DataValue::Stream(data) | DataValue::Line(data) => data.clone(),
            DataValue::Http(msg) => msg.body.clone(),
        }
    }

    pub fn as_http(&self) -> Option<&HttpMessage> {
        match self {
            DataValue::Http(msg) => Some(msg),
            _ => None,
        }
    }
}
