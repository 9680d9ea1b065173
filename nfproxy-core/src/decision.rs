//! The single outcome of one dispatch, handed to the interception layer.

use std::fmt;

use bytes::Bytes;

use crate::action::Action;

/// `matched_by` value used when a buffer overflow ended the dispatch.
pub const MAX_STREAM_SIZE_REACHED: &str = "@MAX_STREAM_SIZE_REACHED";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// Handler name, the overflow sentinel, or `None` when nothing matched.
    pub matched_by: Option<String>,
    /// Packet bytes after the mangling handler ran; only set for [`Action::Mangle`].
    pub mangled_bytes: Option<Bytes>,
}

impl Decision {
    pub fn accept() -> Self {
        Self {
            action: Action::Accept,
            matched_by: None,
            mangled_bytes: None,
        }
    }

    /// A drop or reject attributed to `matched_by`.
    pub fn block(action: Action, matched_by: impl Into<String>) -> Self {
        debug_assert!(matches!(action, Action::Drop | Action::Reject));
        Self {
            action,
            matched_by: Some(matched_by.into()),
            mangled_bytes: None,
        }
    }

    pub fn stream_full(action: Action) -> Self {
        Self::block(action, MAX_STREAM_SIZE_REACHED)
    }

    pub fn mangle(matched_by: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            action: Action::Mangle,
            matched_by: Some(matched_by.into()),
            mangled_bytes: Some(bytes),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.action == Action::Accept
    }
}

impl Default for Decision {
    fn default() -> Self {
        Self::accept()
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matched_by {
            Some(name) => write!(f, "{} ({})", self.action, name),
            None => write!(f, "{}", self.action),
        }
    }
}
