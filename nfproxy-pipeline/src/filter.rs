//! ## nfproxy-pipeline::filter
//! Contract between the engine and an execution backend.
//!
//! A backend hands the builder callables implementing [`PacketFilter`]. Each
//! declares its parameters with a data-type annotation and, when called,
//! receives the resolved values in declaration order together with the
//! current packet. It may rewrite the packet payload and must return a
//! [`FilterReturn`]; it has no other way to affect the engine.

use std::marker::PhantomData;

use nfproxy_core::action::Action;
use nfproxy_core::datatype::{DataType, DataValue};
use nfproxy_core::packet::RawPacket;
use thiserror::Error;

/// Declared type of a filter parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Annotation {
    Data(DataType),
    /// A type name that is not a known data type.
    Unrecognized(String),
    /// The parameter carries no annotation.
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub annotation: Annotation,
}

impl Param {
    pub fn new(name: impl Into<String>, tag: DataType) -> Self {
        Self {
            name: name.into(),
            annotation: Annotation::Data(tag),
        }
    }

    /// Parses `type_name` as a data type, keeping it verbatim when unknown.
    pub fn annotated(name: impl Into<String>, type_name: &str) -> Self {
        let annotation = match type_name.parse::<DataType>() {
            Ok(tag) => Annotation::Data(tag),
            Err(()) => Annotation::Unrecognized(type_name.to_string()),
        };
        Self {
            name: name.into(),
            annotation,
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: Annotation::Missing,
        }
    }
}

/// What a filter handed back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterReturn {
    /// No return value; same as accept.
    Nothing,
    Action(Action),
    /// Anything that is not an action, described by the backend.
    Other(String),
}

impl From<Action> for FilterReturn {
    fn from(action: Action) -> Self {
        FilterReturn::Action(action)
    }
}

impl From<Option<Action>> for FilterReturn {
    fn from(action: Option<Action>) -> Self {
        action.map_or(FilterReturn::Nothing, FilterReturn::Action)
    }
}

impl From<()> for FilterReturn {
    fn from(_: ()) -> Self {
        FilterReturn::Nothing
    }
}

/// Failure raised inside a backend while running a filter.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FilterError(pub String);

/// Arguments of one filter invocation.
pub struct FilterCall<'a> {
    args: Vec<DataValue>,
    packet: &'a mut RawPacket,
}

impl<'a> FilterCall<'a> {
    pub fn new(args: Vec<DataValue>, packet: &'a mut RawPacket) -> Self {
        Self { args, packet }
    }

    /// Resolved values, in the order the parameters were declared.
    pub fn args(&self) -> &[DataValue] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&DataValue> {
        self.args.get(index)
    }

    pub fn packet(&self) -> &RawPacket {
        &*self.packet
    }

    /// The live packet. Rewriting its payload and returning
    /// [`Action::Mangle`] forwards the rewritten bytes.
    pub fn packet_mut(&mut self) -> &mut RawPacket {
        &mut *self.packet
    }
}

pub trait PacketFilter: Send + Sync {
    fn params(&self) -> &[Param];

    fn call(&self, call: &mut FilterCall<'_>) -> Result<FilterReturn, FilterError>;
}

/// A filter backed by a Rust closure.
pub struct FnFilter<F, R> {
    params: Vec<Param>,
    func: F,
    _ret: PhantomData<fn() -> R>,
}

impl<F, R> FnFilter<F, R>
where
    F: Fn(&mut FilterCall<'_>) -> R + Send + Sync,
    R: Into<FilterReturn>,
{
    pub fn new(params: Vec<Param>, func: F) -> Self {
        Self {
            params,
            func,
            _ret: PhantomData,
        }
    }
}

impl<F, R> PacketFilter for FnFilter<F, R>
where
    F: Fn(&mut FilterCall<'_>) -> R + Send + Sync,
    R: Into<FilterReturn>,
{
    fn params(&self) -> &[Param] {
        &self.params
    }

    fn call(&self, call: &mut FilterCall<'_>) -> Result<FilterReturn, FilterError> {
        Ok((self.func)(call).into())
    }
}
