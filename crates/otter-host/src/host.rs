//! The engine-host contract consumed by the bridge

use crate::error::{HostError, HostResult};
use crate::object::{BufferInfo, ObjectInfo};
use crate::value::{HostFunction, RawHandle, ScriptValue};

/// Identifier distinguishing engine instances within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(pub u64);

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Lowest language version with promise support
pub const PROMISE_LANGUAGE_VERSION: u32 = 6;

/// Primitives an embedded scripting engine provides to the bridge
///
/// Every method except [`run_exclusive`](EngineHost::run_exclusive) and
/// [`release`](EngineHost::release) must be called from inside an exclusive
/// turn. `release` may be called from anywhere but implementations are free
/// to require a turn as well; the bridge always calls it inside one.
pub trait EngineHost: Send + Sync + 'static {
    /// Identity of this engine instance
    fn engine_id(&self) -> EngineId;

    /// Human-readable engine name
    fn name(&self) -> &str;

    /// Base language version implemented by the engine
    fn language_version(&self) -> u32;

    /// Whether the engine can create and resolve promises
    fn supports_promises(&self) -> bool {
        self.language_version() >= PROMISE_LANGUAGE_VERSION
    }

    /// Run `f` on the engine's single logical execution context
    ///
    /// Calls may nest on the thread that owns the turn.
    fn run_exclusive(&self, f: &mut dyn FnMut());

    /// Capability flags of a handle
    fn object_info(&self, handle: &RawHandle) -> HostResult<ObjectInfo>;

    /// Engine-assigned identity hash, equal for every handle to one object
    fn identity_hash(&self, handle: &RawHandle) -> HostResult<i32>;

    fn get_property(&self, handle: &RawHandle, name: &str) -> HostResult<ScriptValue>;

    /// Get a property only if it exists on the object
    fn try_get_property(&self, handle: &RawHandle, name: &str) -> HostResult<Option<ScriptValue>>;

    fn set_property(&self, handle: &RawHandle, name: &str, value: &ScriptValue) -> HostResult<()>;

    fn delete_property(&self, handle: &RawHandle, name: &str) -> HostResult<bool>;

    fn get_index(&self, handle: &RawHandle, index: u32) -> HostResult<ScriptValue>;

    fn set_index(&self, handle: &RawHandle, index: u32, value: &ScriptValue) -> HostResult<()>;

    fn delete_index(&self, handle: &RawHandle, index: u32) -> HostResult<bool>;

    /// Enumerable own property names, optionally including integer indices
    fn property_names(&self, handle: &RawHandle, include_indices: bool) -> HostResult<Vec<String>>;

    /// Enumerable own integer indices
    fn property_indices(&self, handle: &RawHandle) -> HostResult<Vec<u32>>;

    /// Call the object as a function (`this` undefined) or as a constructor
    fn invoke(
        &self,
        handle: &RawHandle,
        as_constructor: bool,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue>;

    /// Call the method `name` with the object as receiver
    fn invoke_method(
        &self,
        handle: &RawHandle,
        name: &str,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue>;

    /// Call `method` with `holder` as receiver
    fn invoke_as_method(
        &self,
        holder: &RawHandle,
        method: &RawHandle,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue>;

    /// Layout of a buffer or view
    fn buffer_info(&self, handle: &RawHandle) -> HostResult<BufferInfo>;

    /// Give `f` direct access to the bytes of a buffer or view
    ///
    /// The slice is only valid for the duration of the callback.
    fn with_buffer_data(&self, handle: &RawHandle, f: &mut dyn FnMut(&mut [u8])) -> HostResult<()>;

    /// Create a promise, calling `executor` synchronously with the
    /// `(resolve, reject)` functions
    fn create_promise(&self, executor: HostFunction) -> HostResult<ScriptValue>;

    /// Create an engine error value from a host error
    ///
    /// Script errors keep their name, message and stack; other errors become
    /// a generic error whose cause is the original.
    fn make_error(&self, error: &HostError) -> HostResult<ScriptValue>;

    /// Re-raise a thrown value in the host error channel
    fn throw_value(&self, value: &ScriptValue) -> HostError;

    /// Release a handle; the engine may reclaim the object afterwards
    fn release(&self, handle: RawHandle);
}
