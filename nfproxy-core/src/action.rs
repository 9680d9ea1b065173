//! ## nfproxy-core::action
//! Verdicts returned by filters and the policy applied when a stream buffer is full.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseActionError {
    kind: &'static str,
    value: String,
}

/// Verdict a filter hands back for the current packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Continue with the next handler.
    Accept,
    /// Silently discard the packet.
    Drop,
    /// Discard the packet and notify the peer.
    Reject,
    /// Forward the bytes the filter rewrote.
    Mangle,
}

impl Action {
    /// Whether this verdict stops the pipeline.
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Action::Accept)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Drop => "drop",
            Action::Reject => "reject",
            Action::Mangle => "mangle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Action::Accept),
            "drop" => Ok(Action::Drop),
            "reject" => Ok(Action::Reject),
            "mangle" => Ok(Action::Mangle),
            _ => Err(ParseActionError {
                kind: "action",
                value: s.to_string(),
            }),
        }
    }
}

/// What happens when a reconstruction buffer grows past `stream_max_size`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullStreamAction {
    /// Clear the buffer and keep the connection alive.
    #[default]
    Flush,
    /// Drop the packet that overflowed the buffer.
    Drop,
    /// Reject the packet that overflowed the buffer.
    Reject,
}

impl FullStreamAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FullStreamAction::Flush => "flush",
            FullStreamAction::Drop => "drop",
            FullStreamAction::Reject => "reject",
        }
    }
}

impl fmt::Display for FullStreamAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FullStreamAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flush" => Ok(FullStreamAction::Flush),
            "drop" => Ok(FullStreamAction::Drop),
            "reject" => Ok(FullStreamAction::Reject),
            _ => Err(ParseActionError {
                kind: "full stream action",
                value: s.to_string(),
            }),
        }
    }
}
