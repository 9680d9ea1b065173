//! Engine defaults used when a filter script leaves them unset.

use nfproxy_core::action::FullStreamAction;
use nfproxy_core::context::{StreamLimits, DEFAULT_STREAM_MAX_SIZE};
use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct EngineConfig {
    /// Protocol compiled when neither the script nor the caller names one.
    #[serde(default = "default_protocol")]
    #[validate(custom(function = validation::validate_protocol))]
    pub protocol: String,

    /// Reconstruction buffer limit in bytes.
    #[serde(default = "default_stream_max_size")]
    #[validate(range(min = 1))]
    pub default_stream_max_size: usize,

    #[serde(default)]
    pub default_full_stream_action: FullStreamAction,
}

impl EngineConfig {
    pub fn limits(&self) -> StreamLimits {
        StreamLimits {
            stream_max_size: self.default_stream_max_size,
            full_stream_action: self.default_full_stream_action,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            default_stream_max_size: default_stream_max_size(),
            default_full_stream_action: FullStreamAction::default(),
        }
    }
}

fn default_protocol() -> String {
    "tcp".into()
}

fn default_stream_max_size() -> usize {
    DEFAULT_STREAM_MAX_SIZE
}
