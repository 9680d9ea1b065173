//! Evaluation namespace of one loaded filter script.
//!
//! Each compile gets its own namespace: a backend evaluates a script into a
//! fresh [`Namespace`] and passes it to one builder call. Nothing is shared
//! between compiles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nfproxy_core::action::FullStreamAction;

use crate::filter::PacketFilter;

/// A non-callable value bound in a script.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ScriptValue>),
    FullStreamAction(FullStreamAction),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "str",
            ScriptValue::List(_) => "list",
            ScriptValue::FullStreamAction(_) => "FullStreamAction",
        }
    }
}

#[derive(Clone)]
pub enum Binding {
    Filter(Arc<dyn PacketFilter>),
    Value(ScriptValue),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Filter(filter) => f
                .debug_struct("Filter")
                .field("params", &filter.params())
                .finish(),
            Binding::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Namespace {
    bindings: HashMap<String, Binding>,
    registered: Vec<String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a filter and records it in registration order.
    pub fn register_filter(&mut self, name: impl Into<String>, filter: Arc<dyn PacketFilter>) {
        let name = name.into();
        if !self.registered.contains(&name) {
            self.registered.push(name.clone());
        }
        self.bindings.insert(name, Binding::Filter(filter));
    }

    /// Binds a value. Rebinding a registered filter name removes it from the registration list.
    pub fn set(&mut self, name: impl Into<String>, value: ScriptValue) {
        let name = name.into();
        self.registered.retain(|registered| registered != &name);
        self.bindings.insert(name, Binding::Value(value));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&ScriptValue> {
        match self.bindings.get(name) {
            Some(Binding::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Filter names in the order the script registered them.
    pub fn registered(&self) -> &[String] {
        &self.registered
    }
}
