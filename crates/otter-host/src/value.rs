//! Values as they cross the engine boundary
//!
//! A [`ScriptValue`] is the engine-side representation of a value. Heap
//! references travel as [`RawHandle`]s:
//!
//! - a handle *returned* by the engine is fresh and owned by the receiver,
//!   which must hand it back through [`EngineHost::release`] exactly once;
//! - a handle *passed* to the engine as an argument is only borrowed for the
//!   duration of that call.
//!
//! [`EngineHost::release`]: crate::EngineHost::release

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::HostResult;

/// Opaque reference to an object living in the engine heap
///
/// Handles are deliberately not `Clone`: each one is released exactly once.
#[derive(PartialEq, Eq, Hash)]
pub struct RawHandle(u64);

impl RawHandle {
    /// Create a handle from an engine-assigned slot number
    ///
    /// Only engine implementations should mint handles.
    pub fn from_raw(slot: u64) -> Self {
        Self(slot)
    }

    /// Get the engine-assigned slot number
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

/// Callback signature for host functions invoked by the engine
///
/// Argument values are owned by the callee; the returned value is borrowed
/// by the engine until the call returns.
pub type HostCallback = dyn Fn(Vec<ScriptValue>) -> HostResult<ScriptValue> + Send + Sync;

/// A host function the engine can call
#[derive(Clone)]
pub struct HostFunction {
    name: Arc<str>,
    callback: Arc<HostCallback>,
}

impl HostFunction {
    /// Create a named host function
    pub fn new<F>(name: impl Into<Arc<str>>, callback: F) -> Self
    where
        F: Fn(Vec<ScriptValue>) -> HostResult<ScriptValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    /// Function name (diagnostics only)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the function
    pub fn call(&self, args: Vec<ScriptValue>) -> HostResult<ScriptValue> {
        (self.callback)(args)
    }

    /// Whether two values refer to the same host function
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name)
    }
}

/// Host data exposed to the engine
#[derive(Clone)]
pub enum HostObject {
    /// Callable host function
    Function(HostFunction),
    /// Arbitrary host data, opaque to the engine
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl HostObject {
    /// Wrap arbitrary host data
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    /// Downcast opaque host data
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Opaque(data) => data.downcast_ref::<T>(),
            Self::Function(_) => None,
        }
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(func) => func.fmt(f),
            Self::Opaque(_) => write!(f, "HostObject(<opaque>)"),
        }
    }
}

/// Engine-side value
#[derive(Debug)]
pub enum ScriptValue {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Number(f64),
    BigInt(i64),
    String(String),
    /// Reference to an engine heap object
    Object(RawHandle),
    /// Host data passed through the engine
    Host(HostObject),
}

impl ScriptValue {
    /// Check if the value is undefined
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if the value references an engine heap object
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    /// Borrow the handle of an object value
    pub fn as_handle(&self) -> Option<&RawHandle> {
        match self {
            Self::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Number(n) => Some(*n),
            Self::BigInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Borrow a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) | Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Host(HostObject::Function(_)) => "function",
            Self::Host(HostObject::Opaque(_)) => "host object",
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<HostFunction> for ScriptValue {
    fn from(func: HostFunction) -> Self {
        Self::Host(HostObject::Function(func))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_function_call() {
        let double = HostFunction::new("double", |args| match args.first() {
            Some(ScriptValue::Int32(n)) => Ok(ScriptValue::Int32(n * 2)),
            _ => Ok(ScriptValue::Undefined),
        });

        match double.call(vec![ScriptValue::Int32(21)]).unwrap() {
            ScriptValue::Int32(n) => assert_eq!(n, 42),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(double.name(), "double");
    }

    #[test]
    fn test_host_object_identity() {
        let a = HostObject::opaque(5u32);
        let b = a.clone();
        let c = HostObject::opaque(5u32);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.downcast_ref::<u32>(), Some(&5));
        assert_eq!(a.downcast_ref::<i64>(), None);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ScriptValue::Int32(1).type_name(), "number");
        assert_eq!(ScriptValue::Object(RawHandle::from_raw(1)).type_name(), "object");
        assert_eq!(ScriptValue::from("x").as_str(), Some("x"));
        assert_eq!(ScriptValue::Number(1.5).as_f64(), Some(1.5));
    }
}
