//! # nfproxy-pipeline
//!
//! Compiles filter scripts into pipelines and evaluates them packet by packet.
//!
//! ### Key Submodules:
//! - `filter`: the callable contract an execution backend implements
//! - `namespace`: bindings produced by evaluating one script
//! - `builder`: binds enabled filters to protocol extractors
//! - `dispatch`: the per-packet decision algorithm
//! - `compile`: resolves stream limits and produces the immutable configuration

pub mod builder;
pub mod compile;
pub mod dispatch;
pub mod filter;
pub mod namespace;

pub use builder::{BoundParam, FilterHandler, FilterHandlerBuilder, Pipeline};
pub use compile::{Compiler, FilterConfig, FGEX_FULL_STREAM_ACTION, FGEX_STREAM_MAX_SIZE};
pub use dispatch::dispatch;
pub use filter::{Annotation, FilterCall, FilterError, FilterReturn, FnFilter, PacketFilter, Param};
pub use namespace::{Binding, Namespace, ScriptValue};
