//! Engine-host contract for the otter script bridge.
//!
//! This crate defines what a scripting engine must provide so that host code
//! can work with its objects: the [`EngineHost`] trait, boundary values
//! ([`ScriptValue`], [`RawHandle`]), object capability metadata
//! ([`ObjectInfo`]) and the [`HostError`] channel. It also ships
//! [`MemoryEngine`], an in-process engine used for testing and embedding
//! without a real interpreter.
//!
//! # Example
//!
//! ```
//! use otter_host::{EngineHost, HostFunction, MemoryEngine, ScriptValue};
//!
//! let engine = MemoryEngine::new();
//! engine.exclusive(|engine| {
//!     let arr = engine.new_array(&[ScriptValue::Int32(1)]).unwrap();
//!     engine.invoke_method(&arr, "push", &[ScriptValue::Int32(2)]).unwrap();
//!     assert_eq!(engine.property_indices(&arr).unwrap(), vec![0, 1]);
//!     engine.release(arr);
//! });
//! ```
//!
//! # Handle Ownership
//!
//! Handles returned by the engine are owned by the caller and must be
//! released exactly once. They cannot be duplicated:
//!
//! ```compile_fail
//! use otter_host::{MemoryEngine, RawHandle};
//!
//! let engine = MemoryEngine::new();
//! let handle: RawHandle = engine.exclusive(|engine| engine.new_object());
//! let copy = handle.clone(); // Error: RawHandle is not Clone
//! ```

mod error;
mod host;
mod memory;
mod object;
mod value;

pub use error::{ErrorCause, HostError, HostResult};
pub use host::{EngineHost, EngineId, PROMISE_LANGUAGE_VERSION};
pub use memory::{
    MemoryEngine, MemoryEngineBuilder, MemoryEngineConfig, MemoryEngineStats,
    MemoryEngineStatsSnapshot, NativeFn, PromiseOutcome,
};
pub use object::{BufferInfo, BufferKind, ObjectFlags, ObjectInfo, ObjectKind};
pub use value::{HostCallback, HostFunction, HostObject, RawHandle, ScriptValue};
