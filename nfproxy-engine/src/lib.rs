//! # nfproxy Engine
//!
//! Embedding runtime around the dispatcher: keeps the current compiled
//! configuration, one stream context per connection, and records every
//! decision. Packets of one connection are dispatched one at a time in
//! arrival order; different connections dispatch in parallel.

pub mod engine;
pub mod error;
pub mod replay;

pub use engine::Engine;
pub use error::EngineError;
pub use replay::{replay, ReplayRecord, Trace, TracePacket};
