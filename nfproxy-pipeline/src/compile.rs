//! ## nfproxy-pipeline::compile
//! **Compile-time configuration resolution**
//!
//! Turns an evaluated script namespace into a [`FilterConfig`]: the pipeline
//! for the target protocol plus the stream limits every connection created
//! under it will use. A `FilterConfig` is never mutated after compile; a
//! reload produces a new one.

use std::sync::Arc;

use nfproxy_core::action::FullStreamAction;
use nfproxy_core::context::{StreamContext, StreamLimits};
use nfproxy_core::decision::Decision;
use nfproxy_core::error::{ConfigurationError, DispatchError};
use nfproxy_core::packet::RawPacket;
use nfproxy_core::registry::ProtocolRegistry;
use tracing::{debug, warn};

use crate::builder::{FilterHandlerBuilder, Pipeline};
use crate::dispatch::dispatch;
use crate::namespace::{Namespace, ScriptValue};

/// Script global overriding the reconstruction buffer limit.
pub const FGEX_STREAM_MAX_SIZE: &str = "FGEX_STREAM_MAX_SIZE";
/// Script global overriding the overflow policy.
pub const FGEX_FULL_STREAM_ACTION: &str = "FGEX_FULL_STREAM_ACTION";

/// Immutable output of one compile.
#[derive(Clone, Debug)]
pub struct FilterConfig {
    pipeline: Pipeline,
    limits: StreamLimits,
}

impl FilterConfig {
    pub fn new(pipeline: Pipeline, limits: StreamLimits) -> Self {
        Self { pipeline, limits }
    }

    /// Accepts everything; used before any script has been loaded.
    pub fn passthrough(protocol: impl Into<String>, limits: StreamLimits) -> Self {
        Self::new(Pipeline::empty(protocol), limits)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn limits(&self) -> StreamLimits {
        self.limits
    }

    /// A fresh context bound to these limits.
    pub fn new_context(&self) -> StreamContext {
        StreamContext::new(self.limits)
    }

    pub fn dispatch(
        &self,
        ctx: &mut StreamContext,
        packet: RawPacket,
    ) -> Result<Decision, DispatchError> {
        dispatch(&self.pipeline, ctx, packet)
    }
}

pub struct Compiler<'r> {
    registry: &'r dyn ProtocolRegistry,
    defaults: StreamLimits,
}

impl<'r> Compiler<'r> {
    /// `defaults` supplies the limits used when the script leaves them unset.
    pub fn new(registry: &'r dyn ProtocolRegistry, defaults: StreamLimits) -> Self {
        Self { registry, defaults }
    }

    pub fn compile<S: AsRef<str>>(
        &self,
        namespace: &Namespace,
        protocol: &str,
        enabled: &[S],
    ) -> Result<Arc<FilterConfig>, ConfigurationError> {
        let limits = StreamLimits {
            stream_max_size: self.stream_max_size(namespace)?,
            full_stream_action: self.full_stream_action(namespace),
        };
        let pipeline = FilterHandlerBuilder::new(self.registry).build(protocol, namespace, enabled)?;

        debug!(
            protocol,
            handlers = pipeline.len(),
            stream_max_size = limits.stream_max_size,
            full_stream_action = %limits.full_stream_action,
            "filter configuration compiled"
        );
        Ok(Arc::new(FilterConfig::new(pipeline, limits)))
    }

    fn stream_max_size(&self, namespace: &Namespace) -> Result<usize, ConfigurationError> {
        let fallback = self.defaults.stream_max_size;
        let Some(value) = namespace.value(FGEX_STREAM_MAX_SIZE) else {
            return Ok(fallback);
        };

        let size = match value {
            ScriptValue::Null => None,
            ScriptValue::Int(n) => positive(*n as f64),
            ScriptValue::Float(f) => positive(*f),
            ScriptValue::Str(s) => {
                let parsed = s.trim().parse::<f64>().map_err(|_| ConfigurationError::InvalidOverride {
                    name: FGEX_STREAM_MAX_SIZE.to_string(),
                    reason: format!("'{s}' is not a number"),
                })?;
                positive(parsed)
            }
            other => {
                return Err(ConfigurationError::InvalidOverride {
                    name: FGEX_STREAM_MAX_SIZE.to_string(),
                    reason: format!("expected a number, got {}", other.type_name()),
                })
            }
        };

        Ok(size.unwrap_or_else(|| {
            warn!(value = ?value, default = fallback, "{FGEX_STREAM_MAX_SIZE} is not positive, using default");
            fallback
        }))
    }

    fn full_stream_action(&self, namespace: &Namespace) -> FullStreamAction {
        let fallback = self.defaults.full_stream_action;
        let Some(value) = namespace.value(FGEX_FULL_STREAM_ACTION) else {
            return fallback;
        };
        let action = match value {
            ScriptValue::FullStreamAction(action) => Some(*action),
            ScriptValue::Str(s) => s.parse().ok(),
            _ => None,
        };
        action.unwrap_or_else(|| {
            warn!(value = ?value, default = %fallback, "{FGEX_FULL_STREAM_ACTION} is not a valid action, using default");
            fallback
        })
    }
}

/// Whole bytes of a positive size; `None` for zero, negatives and NaN.
fn positive(n: f64) -> Option<usize> {
    (n >= 1.0).then(|| n as usize)
}
