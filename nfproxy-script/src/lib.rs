//! # nfproxy Filter Scripts
//!
//! Execution backend that evaluates operator-supplied YAML filter scripts.
//! A script can only declare filters over the protocol data types, match
//! bytes, rewrite the packet payload and return an action. It has no other
//! access to the host.

pub mod error;
pub mod matcher;
pub mod model;
pub mod rule;
mod script;

pub use error::ScriptError;
pub use rule::RuleFilter;
pub use script::Script;
