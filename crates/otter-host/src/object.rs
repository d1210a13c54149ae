//! Object capability metadata reported by an engine
//!
//! Proxy construction on the host side is driven entirely by these values,
//! so an engine must report the same [`ObjectInfo`] for every handle to a
//! given object.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// Broad classification of an engine object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Ordinary object, or an object kind without special treatment
    #[default]
    Unknown,
    Function,
    Iterator,
    Promise,
    Array,
    ArrayBuffer,
    DataView,
    TypedArray,
}

/// Additional object attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectFlags(u32);

impl ObjectFlags {
    pub const NONE: Self = Self(0);
    /// Buffer, view, or typed array whose contents live in shared memory
    pub const SHARED: Self = Self(0x1);
    /// Async function or async iterator
    pub const ASYNC: Self = Self(0x2);
    /// Generator or async generator function
    pub const GENERATOR: Self = Self(0x4);

    /// Raw bit representation
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check whether all bits of `other` are set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ObjectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ObjectFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// The kind of an array buffer or view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    ArrayBuffer,
    DataView,
    Uint8,
    Uint8Clamped,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    BigUint64,
    BigInt64,
    Float32,
    Float64,
}

impl BufferKind {
    /// Byte size of each element (1 for raw buffers and data views)
    pub fn element_size(self) -> usize {
        match self {
            Self::ArrayBuffer | Self::DataView => 1,
            Self::Uint8 | Self::Uint8Clamped | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::BigUint64 | Self::BigInt64 | Self::Float64 => 8,
        }
    }

    /// Constructor name as seen by script code
    pub fn name(self) -> &'static str {
        match self {
            Self::ArrayBuffer => "ArrayBuffer",
            Self::DataView => "DataView",
            Self::Uint8 => "Uint8Array",
            Self::Uint8Clamped => "Uint8ClampedArray",
            Self::Int8 => "Int8Array",
            Self::Uint16 => "Uint16Array",
            Self::Int16 => "Int16Array",
            Self::Uint32 => "Uint32Array",
            Self::Int32 => "Int32Array",
            Self::BigUint64 => "BigUint64Array",
            Self::BigInt64 => "BigInt64Array",
            Self::Float32 => "Float32Array",
            Self::Float64 => "Float64Array",
        }
    }

    /// Check if this is a typed array kind
    pub fn is_typed_array(self) -> bool {
        !matches!(self, Self::ArrayBuffer | Self::DataView)
    }

    /// Object kind matching this buffer kind
    pub fn object_kind(self) -> ObjectKind {
        match self {
            Self::ArrayBuffer => ObjectKind::ArrayBuffer,
            Self::DataView => ObjectKind::DataView,
            _ => ObjectKind::TypedArray,
        }
    }
}

/// Capability flags of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub flags: ObjectFlags,
    /// Set for array buffers, data views and typed arrays. An engine may
    /// report a buffer-or-view kind it cannot classify as `None` together
    /// with a buffer object kind.
    pub buffer_kind: Option<BufferKind>,
}

impl ObjectInfo {
    /// Info for an ordinary object
    pub fn plain() -> Self {
        Self::default()
    }

    /// Info for an object of the given kind
    pub fn of_kind(kind: ObjectKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Info for a buffer or view
    pub fn buffer(kind: BufferKind, flags: ObjectFlags) -> Self {
        Self {
            kind: kind.object_kind(),
            flags,
            buffer_kind: Some(kind),
        }
    }

    pub fn is_array(&self) -> bool {
        self.kind == ObjectKind::Array
    }

    /// Check if the object is backed by contiguous bytes
    pub fn is_buffer_or_view(&self) -> bool {
        self.buffer_kind.is_some()
            || matches!(
                self.kind,
                ObjectKind::ArrayBuffer | ObjectKind::DataView | ObjectKind::TypedArray
            )
    }

    pub fn is_promise(&self) -> bool {
        self.kind == ObjectKind::Promise
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(ObjectFlags::SHARED)
    }
}

/// Layout of an array buffer or view
#[derive(Debug)]
pub struct BufferInfo {
    /// Byte offset within the backing buffer
    pub offset: usize,
    /// Size in bytes
    pub size: usize,
    /// Element count (equals `size` for raw buffers and data views)
    pub length: usize,
    /// Fresh handle to the backing buffer; `None` for a raw buffer
    pub buffer: Option<crate::RawHandle>,
}
