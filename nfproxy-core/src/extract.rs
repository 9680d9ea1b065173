//! Result type returned by every extractor.

use crate::action::Action;
use crate::context::StreamContext;
use crate::datatype::DataValue;

/// Derives one data type's value from the stream context.
///
/// Extractors must never block: if the value cannot be produced from what
/// has been observed so far they return [`Extracted::NotReady`].
pub type Extractor = fn(&mut StreamContext) -> Extracted;

/// Feeds the current packet into a reconstruction buffer.
///
/// Runs once per packet for every buffered tag a pipeline uses, whether or
/// not a handler ends up requesting the tag, so no bytes bypass the buffer.
/// It must be idempotent per packet: the matching extractor may call it again.
pub type Ingest = fn(&mut StreamContext);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalAction {
    Drop,
    Reject,
}

impl From<TerminalAction> for Action {
    fn from(action: TerminalAction) -> Self {
        match action {
            TerminalAction::Drop => Action::Drop,
            TerminalAction::Reject => Action::Reject,
        }
    }
}

/// Why an extractor ended the dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalCause {
    /// A reconstruction buffer exceeded `stream_max_size`.
    StreamFull,
    /// The protocol found the stream unrecoverable.
    Protocol,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminal {
    pub action: TerminalAction,
    pub cause: TerminalCause,
}

impl Terminal {
    pub fn stream_full(action: TerminalAction) -> Self {
        Self {
            action,
            cause: TerminalCause::StreamFull,
        }
    }

    pub fn protocol(action: TerminalAction) -> Self {
        Self {
            action,
            cause: TerminalCause::Protocol,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extracted {
    /// The derived value.
    Value(DataValue),
    /// Several values completed by the same packet, in stream order. The
    /// requesting handler runs once per value.
    Values(Vec<DataValue>),
    /// Not enough data yet; only the requesting handler is skipped.
    NotReady,
    /// Ends the dispatch with a drop or reject.
    Terminal(Terminal),
}

impl From<DataValue> for Extracted {
    fn from(value: DataValue) -> Self {
        Extracted::Value(value)
    }
}

impl From<Terminal> for Extracted {
    fn from(terminal: Terminal) -> Self {
        Extracted::Terminal(terminal)
    }
}
