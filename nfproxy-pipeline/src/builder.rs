//! ## nfproxy-pipeline::builder
//! **Filter handler builder**
//!
//! Validates the enabled filters of a namespace against one protocol of the
//! registry and produces an ordered, immutable [`Pipeline`]. Declaration
//! order of the enabled list is evaluation order, and evaluation order is
//! priority: the first handler to return a terminal action decides.
//!
//! Every parameter annotation is bound to its extractor here, so dispatch
//! resolves parameters by direct lookup. Buffered tags also get one feed per
//! pipeline, which dispatch runs on every packet.

use std::fmt;
use std::sync::Arc;

use nfproxy_core::datatype::DataType;
use nfproxy_core::error::ConfigurationError;
use nfproxy_core::extract::{Extractor, Ingest};
use nfproxy_core::registry::ProtocolRegistry;
use tracing::debug;

use crate::filter::{Annotation, PacketFilter};
use crate::namespace::{Binding, Namespace};

/// A parameter with its data type and the extractor that derives it.
#[derive(Clone, Debug)]
pub struct BoundParam {
    pub name: String,
    pub tag: DataType,
    pub extractor: Extractor,
}

/// A reconstruction buffer the pipeline reads, fed on every packet.
#[derive(Clone, Debug)]
pub struct BufferFeed {
    pub tag: DataType,
    pub ingest: Ingest,
    /// First handler requiring the tag; failures of the feed are charged to it.
    pub owner: String,
}

#[derive(Clone)]
pub struct FilterHandler {
    name: String,
    filter: Arc<dyn PacketFilter>,
    params: Vec<BoundParam>,
    protocol: String,
}

impl FilterHandler {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filter(&self) -> &Arc<dyn PacketFilter> {
        &self.filter
    }

    pub fn params(&self) -> &[BoundParam] {
        &self.params
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Data types required by this handler, in declaration order.
    pub fn tags(&self) -> Vec<DataType> {
        self.params.iter().map(|p| p.tag).collect()
    }
}

impl fmt::Debug for FilterHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHandler")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("protocol", &self.protocol)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    protocol: String,
    handlers: Vec<FilterHandler>,
    feeds: Vec<BufferFeed>,
}

impl Pipeline {
    /// A pipeline with no handlers; every packet is accepted.
    pub fn empty(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            handlers: Vec::new(),
            feeds: Vec::new(),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn handlers(&self) -> &[FilterHandler] {
        &self.handlers
    }

    /// Buffered tags of the pipeline, one feed each, in first-use order.
    pub fn feeds(&self) -> &[BufferFeed] {
        &self.feeds
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(FilterHandler::name).collect()
    }

    /// Handler names with their required data types, for comparing builds.
    pub fn signature(&self) -> Vec<(String, Vec<DataType>)> {
        self.handlers
            .iter()
            .map(|h| (h.name.clone(), h.tags()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

pub struct FilterHandlerBuilder<'r> {
    registry: &'r dyn ProtocolRegistry,
}

impl<'r> FilterHandlerBuilder<'r> {
    pub fn new(registry: &'r dyn ProtocolRegistry) -> Self {
        Self { registry }
    }

    /// Builds the pipeline for `enabled`, in that order.
    ///
    /// Fails on an unknown protocol, a name that is unbound or bound to a
    /// value, and on a parameter whose annotation the protocol cannot supply.
    pub fn build<S: AsRef<str>>(
        &self,
        protocol: &str,
        namespace: &Namespace,
        enabled: &[S],
    ) -> Result<Pipeline, ConfigurationError> {
        let spec = self
            .registry
            .protocol(protocol)
            .ok_or_else(|| ConfigurationError::UnknownProtocol(protocol.to_string()))?;

        let mut handlers = Vec::with_capacity(enabled.len());
        let mut feeds: Vec<BufferFeed> = Vec::new();
        for name in enabled {
            let name = name.as_ref();
            let filter = match namespace.get(name) {
                Some(Binding::Filter(filter)) => filter.clone(),
                Some(Binding::Value(_)) => {
                    return Err(ConfigurationError::NotCallable(name.to_string()))
                }
                None => return Err(ConfigurationError::FilterNotFound(name.to_string())),
            };

            let mut params = Vec::with_capacity(filter.params().len());
            for param in filter.params() {
                let tag = match &param.annotation {
                    Annotation::Data(tag) => *tag,
                    Annotation::Unrecognized(annotation) => {
                        return Err(ConfigurationError::InvalidAnnotation {
                            filter: name.to_string(),
                            param: param.name.clone(),
                            annotation: annotation.clone(),
                        })
                    }
                    Annotation::Missing => {
                        return Err(ConfigurationError::MissingAnnotation {
                            filter: name.to_string(),
                            param: param.name.clone(),
                        })
                    }
                };
                let extractor = spec.extractor(tag).ok_or_else(|| {
                    ConfigurationError::InvalidAnnotation {
                        filter: name.to_string(),
                        param: param.name.clone(),
                        annotation: tag.to_string(),
                    }
                })?;
                if let Some(ingest) = spec.ingest(tag) {
                    if !feeds.iter().any(|feed| feed.tag == tag) {
                        feeds.push(BufferFeed {
                            tag,
                            ingest,
                            owner: name.to_string(),
                        });
                    }
                }
                params.push(BoundParam {
                    name: param.name.clone(),
                    tag,
                    extractor,
                });
            }

            debug!(filter = name, protocol, params = params.len(), "filter bound");
            handlers.push(FilterHandler {
                name: name.to_string(),
                filter,
                params,
                protocol: protocol.to_string(),
            });
        }

        Ok(Pipeline {
            protocol: protocol.to_string(),
            handlers,
            feeds,
        })
    }
}
