//! Protocol data registry contract.
//!
//! For every supported protocol the registry maps a data-type tag to the
//! extractor that derives it. The core consumes this table; protocol crates
//! implement it.

use std::collections::BTreeMap;

use crate::datatype::DataType;
use crate::extract::{Extractor, Ingest};

#[derive(Clone, Copy, Debug)]
struct Source {
    extractor: Extractor,
    ingest: Option<Ingest>,
}

/// Extractors supported by one protocol.
#[derive(Clone, Debug)]
pub struct ProtocolSpec {
    name: String,
    sources: BTreeMap<DataType, Source>,
}

impl ProtocolSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: BTreeMap::new(),
        }
    }

    pub fn with(mut self, tag: DataType, extractor: Extractor) -> Self {
        self.sources.insert(
            tag,
            Source {
                extractor,
                ingest: None,
            },
        );
        self
    }

    /// Registers a tag backed by a reconstruction buffer that `ingest` feeds
    /// on every packet.
    pub fn with_buffered(mut self, tag: DataType, extractor: Extractor, ingest: Ingest) -> Self {
        self.sources.insert(
            tag,
            Source {
                extractor,
                ingest: Some(ingest),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn extractor(&self, tag: DataType) -> Option<Extractor> {
        self.sources.get(&tag).map(|source| source.extractor)
    }

    pub fn ingest(&self, tag: DataType) -> Option<Ingest> {
        self.sources.get(&tag).and_then(|source| source.ingest)
    }

    pub fn supports(&self, tag: DataType) -> bool {
        self.sources.contains_key(&tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = DataType> + '_ {
        self.sources.keys().copied()
    }
}

pub trait ProtocolRegistry: Send + Sync {
    /// Looks up a protocol by identifier, e.g. `"tcp"`.
    fn protocol(&self, name: &str) -> Option<&ProtocolSpec>;

    fn protocols(&self) -> Vec<&str>;
}
