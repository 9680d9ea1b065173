//! # nfproxy Protocol Registry
//!
//! Builtin protocol data registry: which data types each protocol can derive
//! from a stream, and the extractors that derive them.
//!
//! | protocol | data types |
//! |----------|------------|
//! | `tcp`    | `RawPacket`, `TCPInputStream`, `TCPOutputStream`, `TextLine` |
//! | `http`   | `RawPacket`, `HttpRequest`, `HttpResponse` |

use std::collections::BTreeMap;

use nfproxy_core::context::StreamContext;
use nfproxy_core::datatype::DataValue;
use nfproxy_core::extract::Extracted;
use nfproxy_core::registry::{ProtocolRegistry, ProtocolSpec};

pub mod http;
mod stream;
pub mod tcp;

pub use http::{HttpParseError, HttpParser};

/// The registry shipped with the engine.
#[derive(Clone, Debug)]
pub struct BuiltinProtocols {
    protocols: BTreeMap<String, ProtocolSpec>,
}

impl BuiltinProtocols {
    pub fn new() -> Self {
        let protocols = [tcp::spec(), http::spec()]
            .into_iter()
            .map(|spec| (spec.name().to_string(), spec))
            .collect();
        Self { protocols }
    }
}

impl Default for BuiltinProtocols {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolRegistry for BuiltinProtocols {
    fn protocol(&self, name: &str) -> Option<&ProtocolSpec> {
        self.protocols.get(name)
    }

    fn protocols(&self) -> Vec<&str> {
        self.protocols.keys().map(String::as_str).collect()
    }
}

/// The current packet. Dispatch seeds it, so this only runs when called directly.
pub(crate) fn raw_packet(ctx: &mut StreamContext) -> Extracted {
    Extracted::Value(DataValue::Packet(ctx.packet().clone()))
}
