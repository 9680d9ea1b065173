//! # nfproxy-core
//!
//! Data model shared by every part of the script-driven packet engine.
//!
//! ### Key Submodules:
//! - `action`: verdicts a filter can return and the full-stream policy
//! - `datatype`: data-type tags and the values extractors derive
//! - `packet`: the raw packet as delivered by the interception layer
//! - `context`: per-connection stream state and the per-packet cache
//! - `extract`: the tagged result every extractor returns
//! - `registry`: the protocol data registry contract
//! - `decision`: the single outcome of one dispatch

pub mod action;
pub mod context;
pub mod datatype;
pub mod decision;
pub mod error;
pub mod extract;
pub mod packet;
pub mod registry;

pub mod prelude {
    pub use crate::action::*;
    pub use crate::context::*;
    pub use crate::datatype::*;
    pub use crate::decision::*;
    pub use crate::error::*;
    pub use crate::extract::*;
    pub use crate::packet::*;
    pub use crate::registry::*;
}

pub use action::{Action, FullStreamAction};
pub use context::{StreamContext, StreamLimits};
pub use datatype::{DataType, DataValue};
pub use decision::{Decision, MAX_STREAM_SIZE_REACHED};
pub use error::{ConfigurationError, DispatchError};
pub use extract::{Extracted, Extractor, Ingest, Terminal, TerminalAction, TerminalCause};
pub use packet::{ConnectionId, RawPacket};
pub use registry::{ProtocolRegistry, ProtocolSpec};
