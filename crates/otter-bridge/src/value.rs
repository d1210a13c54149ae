//! Host-side values
//!
//! [`HostValue`] is what proxy operations accept and return. Primitives are
//! plain copies; engine heap objects appear as [`Proxy`] wrappers and host
//! data passed through the engine as [`HostObject`].

use otter_host::{HostFunction, HostObject};

use crate::proxy::{
    ArrayBufferProxy, DataViewProxy, Proxy, ScriptArray, ScriptObject, ScriptPromise,
    TypedArrayProxy,
};

/// Host-side value
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int32(i32),
    Number(f64),
    BigInt(i64),
    String(String),
    /// Engine heap object
    Proxy(Proxy),
    /// Host data (functions or opaque values)
    Object(HostObject),
}

impl HostValue {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view of an Int32, or of a Number without a fractional part
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(n) => Some(*n),
            Self::Number(n) if n.fract() == 0.0 && *n >= i32::MIN as f64 && *n <= i32::MAX as f64 => {
                Some(*n as i32)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn into_proxy(self) -> Option<Proxy> {
        match self {
            Self::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Name of the value's type, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int32(_) | Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Proxy(p) => p.variant_name(),
            Self::Object(HostObject::Function(_)) => "host function",
            Self::Object(HostObject::Opaque(_)) => "host object",
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Int32(a), Self::Number(b)) | (Self::Number(b), Self::Int32(a)) => {
                f64::from(*a) == *b
            }
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Proxy(a), Self::Proxy(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<u32> for HostValue {
    fn from(n: u32) -> Self {
        i32::try_from(n).map_or(Self::Number(f64::from(n)), Self::Int32)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        Self::BigInt(n)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<HostFunction> for HostValue {
    fn from(func: HostFunction) -> Self {
        Self::Object(HostObject::Function(func))
    }
}

impl From<HostObject> for HostValue {
    fn from(obj: HostObject) -> Self {
        Self::Object(obj)
    }
}

impl From<Proxy> for HostValue {
    fn from(proxy: Proxy) -> Self {
        Self::Proxy(proxy)
    }
}

macro_rules! impl_from_variant {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for HostValue {
                fn from(proxy: $ty) -> Self {
                    Self::Proxy(proxy.into())
                }
            }
        )*
    };
}

impl_from_variant!(
    ScriptObject,
    ScriptArray,
    ScriptPromise,
    ArrayBufferProxy,
    DataViewProxy,
    TypedArrayProxy,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality() {
        assert_eq!(HostValue::Int32(3), HostValue::Number(3.0));
        assert_ne!(HostValue::Int32(3), HostValue::BigInt(3));
        assert_ne!(HostValue::Number(f64::NAN), HostValue::Number(f64::NAN));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(HostValue::from(()), HostValue::Undefined);
        assert_eq!(HostValue::from(Some(2)), HostValue::Int32(2));
        assert_eq!(HostValue::from(None::<i32>), HostValue::Null);
        assert_eq!(HostValue::from(u32::MAX).as_f64(), Some(f64::from(u32::MAX)));
        assert_eq!(HostValue::from("hi").as_str(), Some("hi"));
        assert_eq!(HostValue::Number(4.0).as_i32(), Some(4));
        assert_eq!(HostValue::Number(4.5).as_i32(), None);
    }

    #[test]
    fn test_host_object_identity() {
        let func = HostFunction::new("noop", |_| Ok(otter_host::ScriptValue::Undefined));
        let a = HostValue::from(func.clone());
        let b = HostValue::from(func);
        let c = HostValue::from(HostFunction::new("noop", |_| {
            Ok(otter_host::ScriptValue::Undefined)
        }));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
