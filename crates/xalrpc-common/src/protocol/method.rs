//! Capability interfaces and method resolution.
//!
//! Both sides describe a service with the same static [`Interface`] table, so
//! the client's notion of a one-way method always matches the server's.
//!
//! Overloads are resolved by scoring each candidate against the argument
//! values of a call:
//!
//! - name and arity must match, which earns a base point
//! - a primitive parameter takes a matching value for +1 and refuses null;
//!   integer parameters only match integral numbers
//! - any other parameter takes a value of exactly its kind for +2, a
//!   compatible value for +1 and null for 0
//! - anything else disqualifies the candidate
//!
//! The highest positive score wins; ties go to the method declared first.

use crate::coding::{CodingError, Number, Value};
use crate::protocol::error::{Result, RpcError};

/// Declared kind of a method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// `bool`; null is refused.
    Bool,
    /// Integer primitives; null and fractional numbers are refused.
    Int,
    Long,
    /// Floating point primitives; null is refused.
    Float,
    Double,
    /// `Option<bool>`.
    OptionalBool,
    /// Any `Option` of a number.
    OptionalNumber,
    String,
    Array,
    Object,
    /// A registered extension type, by wire name.
    Extension(&'static str),
    /// A typed array with the given item type.
    TypedArray(&'static str),
    /// Takes any value, null included.
    Any,
}

impl ParamKind {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ParamKind::Bool | ParamKind::Int | ParamKind::Long | ParamKind::Float | ParamKind::Double
        )
    }

    /// Score of `arg` for this parameter, `None` when it cannot be passed.
    pub fn score(&self, arg: &Value) -> Option<u32> {
        if self.is_primitive() {
            return match (self, arg) {
                (ParamKind::Bool, Value::Bool(_)) => Some(1),
                (ParamKind::Int | ParamKind::Long, Value::Number(Number::Integer(_))) => Some(1),
                (ParamKind::Float | ParamKind::Double, Value::Number(_)) => Some(1),
                _ => None,
            };
        }

        match (self, arg) {
            (_, Value::Null) => Some(0),
            (ParamKind::OptionalBool, Value::Bool(_))
            | (ParamKind::OptionalNumber, Value::Number(_))
            | (ParamKind::String, Value::String(_))
            | (ParamKind::Array, Value::Array(_))
            | (ParamKind::Object, Value::Object(_)) => Some(2),
            (ParamKind::Extension(t), Value::Extension(e)) if *t == e.type_name() => Some(2),
            (ParamKind::TypedArray(t), Value::TypedArray(a)) if *t == a.item_type() => Some(2),
            (ParamKind::Array, Value::TypedArray(_)) => Some(1),
            (ParamKind::Any, _) => Some(1),
            _ => None,
        }
    }
}

/// One method of a capability interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    pub name: &'static str,
    pub params: &'static [ParamKind],
    /// One-way methods are sent without waiting for, or sending, a response.
    pub one_way: bool,
}

impl MethodSpec {
    pub const fn new(name: &'static str, params: &'static [ParamKind]) -> Self {
        MethodSpec {
            name,
            params,
            one_way: false,
        }
    }

    pub const fn one_way(name: &'static str, params: &'static [ParamKind]) -> Self {
        MethodSpec {
            name,
            params,
            one_way: true,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Applicability of this method to a call; 0 means not applicable.
    pub fn score(&self, name: &str, args: &[Value]) -> u32 {
        if self.name != name || self.params.len() != args.len() {
            return 0;
        }
        let mut score = 1;
        for (kind, arg) in self.params.iter().zip(args) {
            match kind.score(arg) {
                Some(points) => score += points,
                None => return 0,
            }
        }
        score
    }
}

/// A named set of methods a service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interface {
    pub name: &'static str,
    pub methods: &'static [MethodSpec],
}

impl Interface {
    pub const fn new(name: &'static str, methods: &'static [MethodSpec]) -> Self {
        Interface { name, methods }
    }

    /// Interface with no declared methods. Calls through it are two-way and
    /// resolved entirely by the server.
    pub const fn open(name: &'static str) -> Self {
        Interface { name, methods: &[] }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.methods.iter().any(|m| m.name == name)
    }

    /// Picks the best applicable method for a call.
    pub fn resolve(&self, name: &str, args: &[Value]) -> Option<&'static MethodSpec> {
        resolve(self.methods, name, args)
    }
}

/// Picks the highest scoring method, the earliest declared on ties.
pub fn resolve<'a>(methods: &'a [MethodSpec], name: &str, args: &[Value]) -> Option<&'a MethodSpec> {
    let mut best: Option<(&MethodSpec, u32)> = None;
    for method in methods {
        let score = method.score(name, args);
        if score > 0 && best.map_or(true, |(_, top)| score > top) {
            best = Some((method, score));
        }
    }
    best.map(|(method, _)| method)
}

/// Cache key for a call shape: the method name followed by the type label of
/// each argument, with null arguments left empty. Integral and fractional
/// numbers get different labels since they can select different overloads.
pub fn signature_key(name: &str, args: &[Value]) -> String {
    let mut key = String::from(name);
    for arg in args {
        key.push(':');
        match arg {
            Value::Null => {}
            Value::Number(Number::Integer(_)) => key.push_str("integer"),
            Value::Number(Number::Float(_)) => key.push_str("float"),
            other => key.push_str(&other.type_label()),
        }
    }
    key
}

/// Converts the argument at `index` for use inside a service provider.
pub fn param<T>(params: &[Value], index: usize) -> Result<T>
where
    T: TryFrom<Value, Error = CodingError>,
{
    let value = params
        .get(index)
        .cloned()
        .ok_or_else(|| RpcError::InvalidRequest(format!("missing argument {}", index)))?;
    Ok(T::try_from(value)?)
}
