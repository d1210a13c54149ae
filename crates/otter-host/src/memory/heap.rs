//! Object heap backing [`MemoryEngine`](super::MemoryEngine)
//!
//! Objects are never collected; handles are the only thing with a lifetime.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::{ErrorCause, HostError, HostResult};
use crate::object::{BufferKind, ObjectFlags, ObjectInfo, ObjectKind};
use crate::value::{HostObject, RawHandle, ScriptValue};

use super::NativeFn;
use super::promise::{Job, PromiseSlot};

pub(crate) type ObjectId = usize;

/// Heap-internal value; objects are referenced by id, never by handle
#[derive(Clone, Debug)]
pub(crate) enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Int32(i32),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Object(ObjectId),
    Host(HostObject),
}

impl Value {
    pub(crate) fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a.ptr_eq(b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int32(n) => Some(f64::from(*n)),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// ToInteger-style coercion used by the array builtins
    pub(crate) fn to_integer(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Number(n) if n.is_nan() => Some(0),
            Value::Number(n) => Some(n.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64),
            Value::BigInt(n) => Some(*n),
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::Undefined | Value::Null => Some(0),
            _ => None,
        }
    }
}

/// Format a number the way script code prints it
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parse a canonical array index ("0", "17", not "017" or "-1")
pub(crate) fn parse_index(key: &str) -> Option<u32> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<u32>().ok().filter(|&i| i != u32::MAX)
}

#[derive(Clone)]
pub(crate) enum Callable {
    Native {
        name: String,
        func: NativeFn,
    },
    /// Promise resolve/reject function pair member
    Resolving {
        promise: ObjectId,
        reject: bool,
        done: Arc<AtomicBool>,
    },
}

pub(crate) enum Kind {
    Ordinary,
    Error,
    Array(Vec<Value>),
    Function(Callable),
    ArrayBuffer {
        /// `None` while the bytes are checked out for direct access
        data: Option<Vec<u8>>,
        len: usize,
    },
    View {
        kind: BufferKind,
        buffer: ObjectId,
        offset: usize,
        /// Element count; bytes for data views
        length: usize,
    },
    Promise(PromiseSlot),
}

pub(crate) struct HeapObject {
    pub(crate) kind: Kind,
    pub(crate) flags: ObjectFlags,
    props: Vec<(String, Value)>,
    /// Host error this error object was created from
    pub(crate) cause: Option<ErrorCause>,
}

impl HeapObject {
    pub(crate) fn new(kind: Kind) -> Self {
        Self {
            kind,
            flags: ObjectFlags::NONE,
            props: Vec::new(),
            cause: None,
        }
    }

    pub(crate) fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn prop(&self, name: &str) -> Option<&Value> {
        self.props.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub(crate) fn set_prop(&mut self, name: &str, value: Value) {
        match self.props.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.props.push((name.to_string(), value)),
        }
    }

    fn remove_prop(&mut self, name: &str) -> bool {
        let before = self.props.len();
        self.props.retain(|(k, _)| k != name);
        self.props.len() != before
    }
}

#[derive(Default)]
pub(crate) struct Heap {
    objects: Vec<HeapObject>,
    handles: HashMap<u64, ObjectId>,
    next_handle: u64,
    pub(crate) jobs: VecDeque<Job>,
}

impl Heap {
    pub(crate) fn alloc(&mut self, object: HeapObject) -> ObjectId {
        self.objects.push(object);
        self.objects.len() - 1
    }

    pub(crate) fn object(&self, id: ObjectId) -> &HeapObject {
        &self.objects[id]
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut HeapObject {
        &mut self.objects[id]
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.handles.len()
    }

    /// Mint a fresh handle for `id`
    pub(crate) fn new_handle(&mut self, id: ObjectId) -> RawHandle {
        self.next_handle += 1;
        self.handles.insert(self.next_handle, id);
        RawHandle::from_raw(self.next_handle)
    }

    /// Drop a handle slot; returns false if it was already gone
    pub(crate) fn drop_handle(&mut self, slot: u64) -> bool {
        self.handles.remove(&slot).is_some()
    }

    pub(crate) fn resolve_handle(&self, handle: &RawHandle) -> HostResult<ObjectId> {
        self.handles
            .get(&handle.raw())
            .copied()
            .ok_or(HostError::InvalidHandle(handle.raw()))
    }

    /// Convert a boundary value to a heap value (handles are borrowed)
    pub(crate) fn import(&self, value: &ScriptValue) -> HostResult<Value> {
        Ok(match value {
            ScriptValue::Undefined => Value::Undefined,
            ScriptValue::Null => Value::Null,
            ScriptValue::Boolean(b) => Value::Boolean(*b),
            ScriptValue::Int32(n) => Value::Int32(*n),
            ScriptValue::Number(n) => Value::Number(*n),
            ScriptValue::BigInt(n) => Value::BigInt(*n),
            ScriptValue::String(s) => Value::String(Arc::from(s.as_str())),
            ScriptValue::Object(handle) => Value::Object(self.resolve_handle(handle)?),
            ScriptValue::Host(host) => Value::Host(host.clone()),
        })
    }

    /// Convert a heap value to a boundary value, minting a handle for objects
    pub(crate) fn export(&mut self, value: &Value) -> ScriptValue {
        match value {
            Value::Undefined => ScriptValue::Undefined,
            Value::Null => ScriptValue::Null,
            Value::Boolean(b) => ScriptValue::Boolean(*b),
            Value::Int32(n) => ScriptValue::Int32(*n),
            Value::Number(n) => ScriptValue::Number(*n),
            Value::BigInt(n) => ScriptValue::BigInt(*n),
            Value::String(s) => ScriptValue::String(s.to_string()),
            Value::Object(id) => ScriptValue::Object(self.new_handle(*id)),
            Value::Host(host) => ScriptValue::Host(host.clone()),
        }
    }

    pub(crate) fn info(&self, id: ObjectId) -> ObjectInfo {
        let object = self.object(id);
        let kind = match &object.kind {
            Kind::Ordinary | Kind::Error => ObjectKind::Unknown,
            Kind::Array(_) => ObjectKind::Array,
            Kind::Function(_) => ObjectKind::Function,
            Kind::Promise(_) => ObjectKind::Promise,
            Kind::ArrayBuffer { .. } => {
                return ObjectInfo::buffer(BufferKind::ArrayBuffer, object.flags);
            }
            Kind::View { kind, .. } => return ObjectInfo::buffer(*kind, object.flags),
        };
        ObjectInfo {
            kind,
            flags: object.flags,
            buffer_kind: None,
        }
    }

    pub(crate) fn is_callable(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => matches!(self.object(*id).kind, Kind::Function(_)),
            Value::Host(HostObject::Function(_)) => true,
            _ => false,
        }
    }

    pub(crate) fn is_promise(&self, value: &Value) -> bool {
        match value {
            Value::Object(id) => matches!(self.object(*id).kind, Kind::Promise(_)),
            _ => false,
        }
    }

    /// Byte region `(buffer, offset, size)` addressed by a buffer or view
    pub(crate) fn byte_region(&self, id: ObjectId) -> HostResult<(ObjectId, usize, usize)> {
        match &self.object(id).kind {
            Kind::ArrayBuffer { len, .. } => Ok((id, 0, *len)),
            Kind::View {
                kind,
                buffer,
                offset,
                length,
            } => Ok((*buffer, *offset, length * kind.element_size())),
            _ => Err(HostError::type_error("array buffer or view", "object")),
        }
    }

    fn buffer_bytes(&self, buffer: ObjectId) -> HostResult<&Vec<u8>> {
        match &self.object(buffer).kind {
            Kind::ArrayBuffer { data: Some(data), .. } => Ok(data),
            Kind::ArrayBuffer { data: None, .. } => Err(HostError::Buffer(
                "buffer contents are checked out for direct access".into(),
            )),
            _ => Err(HostError::type_error("ArrayBuffer", "object")),
        }
    }

    fn buffer_bytes_mut(&mut self, buffer: ObjectId) -> HostResult<&mut Vec<u8>> {
        match &mut self.object_mut(buffer).kind {
            Kind::ArrayBuffer { data: Some(data), .. } => Ok(data),
            Kind::ArrayBuffer { data: None, .. } => Err(HostError::Buffer(
                "buffer contents are checked out for direct access".into(),
            )),
            _ => Err(HostError::type_error("ArrayBuffer", "object")),
        }
    }

    /// Take a buffer's bytes out of the heap for direct access
    pub(crate) fn check_out(&mut self, buffer: ObjectId) -> HostResult<Vec<u8>> {
        match &mut self.object_mut(buffer).kind {
            Kind::ArrayBuffer { data, .. } => data.take().ok_or_else(|| {
                HostError::Buffer("buffer contents are checked out for direct access".into())
            }),
            _ => Err(HostError::type_error("ArrayBuffer", "object")),
        }
    }

    pub(crate) fn check_in(&mut self, buffer: ObjectId, bytes: Vec<u8>) {
        if let Kind::ArrayBuffer { data, .. } = &mut self.object_mut(buffer).kind {
            *data = Some(bytes);
        }
    }

    pub(crate) fn get(&self, id: ObjectId, key: &str) -> HostResult<Value> {
        if let Some(index) = parse_index(key) {
            return self.get_index(id, index);
        }
        let object = self.object(id);
        match (&object.kind, key) {
            (Kind::Array(items), "length") => return Ok(length_value(items.len())),
            (Kind::ArrayBuffer { len, .. }, "byteLength") => return Ok(length_value(*len)),
            (Kind::View { kind, length, .. }, "length") if kind.is_typed_array() => {
                return Ok(length_value(*length));
            }
            (Kind::View { kind, length, .. }, "byteLength") => {
                return Ok(length_value(length * kind.element_size()));
            }
            (Kind::View { offset, .. }, "byteOffset") => return Ok(length_value(*offset)),
            _ => {}
        }
        Ok(object.prop(key).cloned().unwrap_or(Value::Undefined))
    }

    pub(crate) fn has_own(&self, id: ObjectId, key: &str) -> bool {
        if let Some(index) = parse_index(key) {
            let index = index as usize;
            return match &self.object(id).kind {
                Kind::Array(items) => index < items.len(),
                Kind::View { length, .. } => index < *length,
                _ => self.object(id).prop(key).is_some(),
            };
        }
        match (&self.object(id).kind, key) {
            (Kind::Array(_), "length") => true,
            _ => self.object(id).prop(key).is_some(),
        }
    }

    pub(crate) fn set(&mut self, id: ObjectId, key: &str, value: Value) -> HostResult<()> {
        if let Some(index) = parse_index(key) {
            return self.set_index(id, index, value);
        }
        if let (Kind::Array(items), "length") = (&mut self.object_mut(id).kind, key) {
            let len = value
                .to_integer()
                .filter(|n| (0..=i64::from(u32::MAX - 1)).contains(n))
                .ok_or_else(|| HostError::script_error("RangeError", "Invalid array length"))?;
            items.resize(len as usize, Value::Undefined);
            return Ok(());
        }
        self.object_mut(id).set_prop(key, value);
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: ObjectId, key: &str) -> HostResult<bool> {
        if let Some(index) = parse_index(key) {
            return self.delete_index(id, index);
        }
        match (&self.object(id).kind, key) {
            (Kind::Array(_), "length") => Ok(false),
            _ => Ok({
                self.object_mut(id).remove_prop(key);
                true
            }),
        }
    }

    pub(crate) fn get_index(&self, id: ObjectId, index: u32) -> HostResult<Value> {
        let object = self.object(id);
        match &object.kind {
            Kind::Array(items) => Ok(items
                .get(index as usize)
                .cloned()
                .unwrap_or(Value::Undefined)),
            Kind::View {
                kind,
                buffer,
                offset,
                length,
            } if kind.is_typed_array() => {
                let index = index as usize;
                if index >= *length {
                    return Ok(Value::Undefined);
                }
                let width = kind.element_size();
                let start = offset + index * width;
                let bytes = self.buffer_bytes(*buffer)?;
                Ok(read_element(*kind, &bytes[start..start + width]))
            }
            _ => Ok(object
                .prop(&index.to_string())
                .cloned()
                .unwrap_or(Value::Undefined)),
        }
    }

    pub(crate) fn set_index(&mut self, id: ObjectId, index: u32, value: Value) -> HostResult<()> {
        match &mut self.object_mut(id).kind {
            Kind::Array(items) => {
                let index = index as usize;
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                Ok(())
            }
            Kind::View {
                kind,
                buffer,
                offset,
                length,
            } if kind.is_typed_array() => {
                let (kind, buffer, offset, length) = (*kind, *buffer, *offset, *length);
                let index = index as usize;
                if index >= length {
                    // out-of-bounds typed array writes are ignored
                    return Ok(());
                }
                let width = kind.element_size();
                let start = offset + index * width;
                let bytes = self.buffer_bytes_mut(buffer)?;
                write_element(kind, &value, &mut bytes[start..start + width]);
                Ok(())
            }
            _ => {
                self.object_mut(id).set_prop(&index.to_string(), value);
                Ok(())
            }
        }
    }

    pub(crate) fn delete_index(&mut self, id: ObjectId, index: u32) -> HostResult<bool> {
        match &mut self.object_mut(id).kind {
            Kind::Array(items) => {
                if let Some(slot) = items.get_mut(index as usize) {
                    *slot = Value::Undefined;
                }
                Ok(true)
            }
            Kind::View { length, .. } => Ok(index as usize >= *length),
            _ => Ok({
                self.object_mut(id).remove_prop(&index.to_string());
                true
            }),
        }
    }

    /// Own enumerable keys: integer indices ascending, then names in insertion order
    pub(crate) fn own_keys(&self, id: ObjectId, include_indices: bool) -> Vec<String> {
        let object = self.object(id);
        let mut keys = Vec::new();
        if include_indices {
            keys.extend(self.own_indices(id).into_iter().map(|i| i.to_string()));
        }
        keys.extend(
            object
                .props
                .iter()
                .filter(|(k, _)| parse_index(k).is_none())
                .map(|(k, _)| k.clone()),
        );
        keys
    }

    pub(crate) fn own_indices(&self, id: ObjectId) -> Vec<u32> {
        let object = self.object(id);
        match &object.kind {
            Kind::Array(items) => (0..items.len() as u32).collect(),
            Kind::View { kind, length, .. } if kind.is_typed_array() => {
                (0..*length as u32).collect()
            }
            _ => {
                let mut indices: Vec<u32> =
                    object.props.iter().filter_map(|(k, _)| parse_index(k)).collect();
                indices.sort_unstable();
                indices
            }
        }
    }

    /// Script-visible string conversion
    pub(crate) fn display(&self, value: &Value) -> String {
        self.display_depth(value, 0)
    }

    fn display_depth(&self, value: &Value, depth: usize) -> String {
        match value {
            Value::Undefined => "undefined".into(),
            Value::Null => "null".into(),
            Value::Boolean(b) => b.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Number(n) => format_number(*n),
            Value::BigInt(n) => n.to_string(),
            Value::String(s) => s.to_string(),
            Value::Host(HostObject::Function(f)) => format!("function {}() {{ [host code] }}", f.name()),
            Value::Host(HostObject::Opaque(_)) => "[object HostObject]".into(),
            Value::Object(id) => {
                let object = self.object(*id);
                match &object.kind {
                    Kind::Array(items) if depth < 8 => items
                        .iter()
                        .map(|item| match item {
                            Value::Undefined | Value::Null => String::new(),
                            other => self.display_depth(other, depth + 1),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    Kind::Error => {
                        let name = object
                            .prop("name")
                            .map(|v| self.display_depth(v, depth + 1))
                            .unwrap_or_else(|| "Error".into());
                        match object.prop("message").map(|v| self.display_depth(v, depth + 1)) {
                            Some(message) if !message.is_empty() => format!("{}: {}", name, message),
                            _ => name,
                        }
                    }
                    Kind::Function(Callable::Native { name, .. }) => {
                        format!("function {}() {{ [native code] }}", name)
                    }
                    Kind::Function(_) => "function () { [native code] }".into(),
                    Kind::Promise(_) => "[object Promise]".into(),
                    Kind::ArrayBuffer { .. } => "[object ArrayBuffer]".into(),
                    Kind::View { kind, .. } => format!("[object {}]", kind.name()),
                    _ => "[object Object]".into(),
                }
            }
        }
    }

    /// Structured error details of a thrown value
    pub(crate) fn error_details(
        &self,
        thrown: &Value,
    ) -> (String, String, Option<String>, Option<ErrorCause>) {
        if let Value::Object(id) = thrown {
            let object = self.object(*id);
            if matches!(object.kind, Kind::Error) || object.prop("message").is_some() {
                let name = object
                    .prop("name")
                    .map(|v| self.display(v))
                    .unwrap_or_else(|| "Error".into());
                let message = object
                    .prop("message")
                    .map(|v| self.display(v))
                    .unwrap_or_default();
                let stack = match object.prop("stack") {
                    Some(Value::Undefined) | None => None,
                    Some(v) => Some(self.display(v)),
                };
                return (name, message, stack, object.cause.clone());
            }
        }
        ("Error".into(), self.display(thrown), None, None)
    }

    /// Allocate an error object
    pub(crate) fn new_error(
        &mut self,
        name: &str,
        message: &str,
        stack: Option<&str>,
        cause: Option<ErrorCause>,
    ) -> ObjectId {
        let mut object = HeapObject::new(Kind::Error);
        object.set_prop("name", Value::String(Arc::from(name)));
        object.set_prop("message", Value::String(Arc::from(message)));
        if let Some(stack) = stack {
            object.set_prop("stack", Value::String(Arc::from(stack)));
        }
        object.cause = cause;
        self.alloc(object)
    }

    /// Allocate an error object describing a host error
    pub(crate) fn error_from_host(&mut self, error: &HostError) -> ObjectId {
        match error {
            HostError::Script {
                name,
                message,
                stack,
                cause,
                ..
            } => self.new_error(name, message, stack.as_deref(), cause.clone()),
            other => {
                let cause: ErrorCause = Arc::new(other.clone());
                self.new_error(other.error_type(), &other.message(), None, Some(cause))
            }
        }
    }

    pub(crate) fn to_json(&self, value: &Value, depth: usize) -> HostResult<Option<serde_json::Value>> {
        if depth > 64 {
            return Err(HostError::Json("converting circular structure to JSON".into()));
        }
        Ok(Some(match value {
            Value::Undefined | Value::Host(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Int32(n) => serde_json::Value::from(*n),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::BigInt(_) => {
                return Err(HostError::Json("BigInt value can't be serialized".into()));
            }
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(id) => {
                let object = self.object(*id);
                match &object.kind {
                    Kind::Function(_) => return Ok(None),
                    Kind::Array(items) => serde_json::Value::Array(
                        items
                            .iter()
                            .map(|item| {
                                self.to_json(item, depth + 1)
                                    .map(|v| v.unwrap_or(serde_json::Value::Null))
                            })
                            .collect::<HostResult<_>>()?,
                    ),
                    _ => {
                        let mut map = serde_json::Map::new();
                        for key in self.own_keys(*id, true) {
                            let item = self.get(*id, &key)?;
                            if let Some(json) = self.to_json(&item, depth + 1)? {
                                map.insert(key, json);
                            }
                        }
                        serde_json::Value::Object(map)
                    }
                }
            }
        }))
    }
}

fn length_value(len: usize) -> Value {
    i32::try_from(len)
        .map(Value::Int32)
        .unwrap_or(Value::Number(len as f64))
}

fn read_element(kind: BufferKind, bytes: &[u8]) -> Value {
    macro_rules! read {
        ($ty:ty) => {{
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            <$ty>::from_ne_bytes(raw)
        }};
    }
    match kind {
        BufferKind::Uint8 | BufferKind::Uint8Clamped | BufferKind::ArrayBuffer | BufferKind::DataView => {
            Value::Int32(i32::from(bytes[0]))
        }
        BufferKind::Int8 => Value::Int32(i32::from(read!(i8))),
        BufferKind::Uint16 => Value::Int32(i32::from(read!(u16))),
        BufferKind::Int16 => Value::Int32(i32::from(read!(i16))),
        BufferKind::Uint32 => {
            let n = read!(u32);
            i32::try_from(n)
                .map(Value::Int32)
                .unwrap_or(Value::Number(f64::from(n)))
        }
        BufferKind::Int32 => Value::Int32(read!(i32)),
        BufferKind::BigUint64 => Value::BigInt(read!(u64) as i64),
        BufferKind::BigInt64 => Value::BigInt(read!(i64)),
        BufferKind::Float32 => Value::Number(f64::from(read!(f32))),
        BufferKind::Float64 => Value::Number(read!(f64)),
    }
}

fn write_element(kind: BufferKind, value: &Value, out: &mut [u8]) {
    let number = match value {
        Value::BigInt(n) => *n as f64,
        other => other.as_number().unwrap_or(f64::NAN),
    };
    let int = if number.is_finite() { number.trunc() as i64 } else { 0 };
    match kind {
        BufferKind::Uint8 | BufferKind::ArrayBuffer | BufferKind::DataView => out[0] = int as u8,
        BufferKind::Uint8Clamped => {
            out[0] = if number.is_nan() { 0 } else { number.round().clamp(0.0, 255.0) as u8 }
        }
        BufferKind::Int8 => out.copy_from_slice(&(int as i8).to_ne_bytes()),
        BufferKind::Uint16 => out.copy_from_slice(&(int as u16).to_ne_bytes()),
        BufferKind::Int16 => out.copy_from_slice(&(int as i16).to_ne_bytes()),
        BufferKind::Uint32 => out.copy_from_slice(&(int as u32).to_ne_bytes()),
        BufferKind::Int32 => out.copy_from_slice(&(int as i32).to_ne_bytes()),
        BufferKind::BigUint64 | BufferKind::BigInt64 => {
            let n = match value {
                Value::BigInt(n) => *n,
                _ => int,
            };
            out.copy_from_slice(&n.to_ne_bytes());
        }
        BufferKind::Float32 => out.copy_from_slice(&(number as f32).to_ne_bytes()),
        BufferKind::Float64 => out.copy_from_slice(&number.to_ne_bytes()),
    }
}
