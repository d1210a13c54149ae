//! In-process reference engine
//!
//! `MemoryEngine` implements [`EngineHost`] over a plain object heap with
//! arrays, functions, errors, array buffers and views, and promises with a
//! microtask queue. It has no parser: script behavior is supplied as native
//! Rust closures through [`MemoryEngine::new_function`].
//!
//! # Turns
//!
//! All access goes through [`MemoryEngine::exclusive`] (or
//! [`EngineHost::run_exclusive`]). Turns nest on the owning thread and block
//! other threads. Pending promise reactions run when the outermost turn ends.
//! Calls made outside a turn still work but are counted in
//! [`MemoryEngineStatsSnapshot::unsynchronized_calls`].
//!
//! # Example
//!
//! ```
//! use otter_host::{EngineHost, MemoryEngine, ScriptValue};
//!
//! let engine = MemoryEngine::new();
//! engine.exclusive(|engine| {
//!     let obj = engine.new_object();
//!     engine.set_property(&obj, "answer", &ScriptValue::Int32(42)).unwrap();
//!     let value = engine.get_property(&obj, "answer").unwrap();
//!     assert_eq!(value.as_f64(), Some(42.0));
//!     engine.release(obj);
//! });
//! ```

mod heap;
mod promise;

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{HostError, HostResult};
use crate::host::{EngineHost, EngineId};
use crate::object::{BufferInfo, BufferKind, ObjectFlags, ObjectInfo};
use crate::value::{HostFunction, HostObject, RawHandle, ScriptValue};

use heap::{Callable, Heap, HeapObject, Kind, ObjectId, Value};
use promise::{Job, PromiseState};

/// Native function body: `(engine, this, args) -> result`
///
/// `this` and the arguments are valid for the duration of the call and are
/// released by the engine afterwards. A returned object handle is consumed.
pub type NativeFn =
    Arc<dyn Fn(&MemoryEngine, ScriptValue, Vec<ScriptValue>) -> HostResult<ScriptValue> + Send + Sync>;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for a [`MemoryEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEngineConfig {
    /// Engine name reported through [`EngineHost::name`]
    pub name: String,
    /// Base language version; promises need at least 6
    pub language_version: u32,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            name: "memory".to_string(),
            language_version: 11,
        }
    }
}

impl MemoryEngineConfig {
    /// Parse a configuration from JSON, filling in defaults
    pub fn from_json(json: &str) -> HostResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builder for [`MemoryEngine`]
#[derive(Debug, Default)]
pub struct MemoryEngineBuilder {
    config: MemoryEngineConfig,
}

impl MemoryEngineBuilder {
    /// Set the engine name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the base language version
    pub fn language_version(mut self, version: u32) -> Self {
        self.config.language_version = version;
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: MemoryEngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MemoryEngine {
        MemoryEngine::with_config(self.config)
    }
}

/// Counters describing engine usage
#[derive(Debug, Default)]
pub struct MemoryEngineStats {
    /// Handles released through [`EngineHost::release`]
    pub handles_released: AtomicU64,
    /// Engine calls made outside an exclusive turn
    pub unsynchronized_calls: AtomicU64,
}

/// A point-in-time snapshot of engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryEngineStatsSnapshot {
    /// Handles currently held outside the engine
    pub live_handles: u64,
    pub handles_released: u64,
    pub unsynchronized_calls: u64,
}

/// Settled state of a promise as seen from the host
#[derive(Debug)]
pub enum PromiseOutcome {
    Pending,
    Fulfilled(ScriptValue),
    Rejected(ScriptValue),
}

/// Exception in flight inside the engine
struct Thrown {
    value: Value,
    execution_started: bool,
}

type CallResult = Result<Value, Thrown>;

enum Target {
    Script(Callable),
    Host(HostFunction),
}

/// In-process engine implementing [`EngineHost`]
pub struct MemoryEngine {
    id: EngineId,
    config: MemoryEngineConfig,
    /// Turn nesting depth of the owning thread
    turn: ReentrantMutex<Cell<usize>>,
    heap: Mutex<Heap>,
    global: ObjectId,
    stats: MemoryEngineStats,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        Self::with_config(MemoryEngineConfig::default())
    }

    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    pub fn with_config(config: MemoryEngineConfig) -> Self {
        let id = EngineId(NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed));
        let mut heap = Heap::default();
        let global = heap.alloc(HeapObject::new(Kind::Ordinary));
        debug!(engine = %id, name = %config.name, version = config.language_version, "memory engine created");
        Self {
            id,
            config,
            turn: ReentrantMutex::new(Cell::new(0)),
            heap: Mutex::new(heap),
            global,
            stats: MemoryEngineStats::default(),
        }
    }

    pub fn config(&self) -> &MemoryEngineConfig {
        &self.config
    }

    pub fn stats(&self) -> MemoryEngineStatsSnapshot {
        MemoryEngineStatsSnapshot {
            live_handles: self.heap.lock().live_handles() as u64,
            handles_released: self.stats.handles_released.load(Ordering::Relaxed),
            unsynchronized_calls: self.stats.unsynchronized_calls.load(Ordering::Relaxed),
        }
    }

    /// Check whether the current thread is inside an exclusive turn
    pub fn in_turn(&self) -> bool {
        self.turn.try_lock().is_some_and(|depth| depth.get() > 0)
    }

    /// Run `f` inside an exclusive turn and return its result
    pub fn exclusive<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        let depth = self.turn.lock();
        depth.set(depth.get() + 1);
        let result = {
            let _exit = scopeguard::guard((), |()| depth.set(depth.get() - 1));
            f(self)
        };
        if depth.get() == 0 {
            depth.set(1);
            let _exit = scopeguard::guard((), |()| depth.set(0));
            self.drain_microtasks();
        }
        result
    }

    /// Fresh handle to the global object
    pub fn global(&self) -> RawHandle {
        self.check_turn("global");
        self.heap.lock().new_handle(self.global)
    }

    pub fn new_object(&self) -> RawHandle {
        self.alloc_handle("new_object", HeapObject::new(Kind::Ordinary))
    }

    /// Create an array holding copies of `items`
    pub fn new_array(&self, items: &[ScriptValue]) -> HostResult<RawHandle> {
        self.check_turn("new_array");
        let mut heap = self.heap.lock();
        let items = items
            .iter()
            .map(|item| heap.import(item))
            .collect::<HostResult<Vec<_>>>()?;
        let id = heap.alloc(HeapObject::new(Kind::Array(items)));
        Ok(heap.new_handle(id))
    }

    /// Create a function backed by a native closure
    pub fn new_function<F>(&self, name: &str, func: F) -> RawHandle
    where
        F: Fn(&MemoryEngine, ScriptValue, Vec<ScriptValue>) -> HostResult<ScriptValue>
            + Send
            + Sync
            + 'static,
    {
        self.new_function_with_flags(name, ObjectFlags::NONE, func)
    }

    /// Create a native function reporting `flags` (async, generator)
    pub fn new_function_with_flags<F>(&self, name: &str, flags: ObjectFlags, func: F) -> RawHandle
    where
        F: Fn(&MemoryEngine, ScriptValue, Vec<ScriptValue>) -> HostResult<ScriptValue>
            + Send
            + Sync
            + 'static,
    {
        let callable = Callable::Native {
            name: name.to_string(),
            func: Arc::new(func),
        };
        self.alloc_handle(
            "new_function",
            HeapObject::new(Kind::Function(callable)).with_flags(flags),
        )
    }

    /// Create an array buffer owning `bytes`
    pub fn new_array_buffer(&self, bytes: Vec<u8>) -> RawHandle {
        let len = bytes.len();
        self.alloc_handle(
            "new_array_buffer",
            HeapObject::new(Kind::ArrayBuffer {
                data: Some(bytes),
                len,
            }),
        )
    }

    /// Create a zero-filled buffer flagged as shared memory
    pub fn new_shared_array_buffer(&self, len: usize) -> RawHandle {
        self.alloc_handle(
            "new_shared_array_buffer",
            HeapObject::new(Kind::ArrayBuffer {
                data: Some(vec![0; len]),
                len,
            })
            .with_flags(ObjectFlags::SHARED),
        )
    }

    /// Create a typed array of `length` elements over `buffer` at byte `offset`
    pub fn new_typed_array(
        &self,
        kind: BufferKind,
        buffer: &RawHandle,
        offset: usize,
        length: usize,
    ) -> HostResult<RawHandle> {
        if !kind.is_typed_array() {
            return Err(HostError::type_error("typed array kind", kind.name()));
        }
        if offset % kind.element_size() != 0 {
            return Err(HostError::Buffer(format!(
                "start offset of {} should be a multiple of {}",
                kind.name(),
                kind.element_size()
            )));
        }
        self.new_view("new_typed_array", kind, buffer, offset, length)
    }

    /// Create a data view of `size` bytes over `buffer` at byte `offset`
    pub fn new_data_view(&self, buffer: &RawHandle, offset: usize, size: usize) -> HostResult<RawHandle> {
        self.new_view("new_data_view", BufferKind::DataView, buffer, offset, size)
    }

    fn new_view(
        &self,
        operation: &str,
        kind: BufferKind,
        buffer: &RawHandle,
        offset: usize,
        length: usize,
    ) -> HostResult<RawHandle> {
        self.check_turn(operation);
        let mut heap = self.heap.lock();
        let buffer = heap.resolve_handle(buffer)?;
        let (len, flags) = match &heap.object(buffer).kind {
            Kind::ArrayBuffer { len, .. } => (*len, heap.object(buffer).flags),
            _ => return Err(HostError::type_error("ArrayBuffer", "object")),
        };
        let end = length
            .checked_mul(kind.element_size())
            .and_then(|size| size.checked_add(offset));
        if end.is_none_or(|end| end > len) {
            return Err(HostError::Buffer(format!(
                "invalid {} length {} at offset {}",
                kind.name(),
                length,
                offset
            )));
        }
        let id = heap.alloc(
            HeapObject::new(Kind::View {
                kind,
                buffer,
                offset,
                length,
            })
            .with_flags(if flags.contains(ObjectFlags::SHARED) {
                ObjectFlags::SHARED
            } else {
                ObjectFlags::NONE
            }),
        );
        Ok(heap.new_handle(id))
    }

    /// Create an error object
    pub fn new_error(&self, name: &str, message: &str) -> RawHandle {
        self.check_turn("new_error");
        let mut heap = self.heap.lock();
        let id = heap.new_error(name, message, None, None);
        heap.new_handle(id)
    }

    /// Create a pending promise settled through
    /// [`resolve_promise`](Self::resolve_promise) or
    /// [`reject_promise`](Self::reject_promise)
    pub fn new_promise(&self) -> HostResult<RawHandle> {
        self.require_promises()?;
        self.check_turn("new_promise");
        let mut heap = self.heap.lock();
        let id = heap.new_promise();
        Ok(heap.new_handle(id))
    }

    /// Resolve a promise; reactions run when the turn ends
    pub fn resolve_promise(&self, promise: &RawHandle, value: &ScriptValue) -> HostResult<()> {
        self.check_turn("resolve_promise");
        let mut heap = self.heap.lock();
        let id = Self::promise_id(&heap, promise)?;
        let value = heap.import(value)?;
        heap.resolve_promise(id, value);
        Ok(())
    }

    /// Reject a promise; reactions run when the turn ends
    pub fn reject_promise(&self, promise: &RawHandle, reason: &ScriptValue) -> HostResult<()> {
        self.check_turn("reject_promise");
        let mut heap = self.heap.lock();
        let id = Self::promise_id(&heap, promise)?;
        let reason = heap.import(reason)?;
        heap.settle(id, true, reason);
        Ok(())
    }

    /// Current state of a promise
    pub fn promise_outcome(&self, promise: &RawHandle) -> HostResult<PromiseOutcome> {
        self.check_turn("promise_outcome");
        let mut heap = self.heap.lock();
        let id = Self::promise_id(&heap, promise)?;
        let state = heap.promise_state(id).cloned();
        Ok(match state {
            Some(PromiseState::Fulfilled(value)) => PromiseOutcome::Fulfilled(heap.export(&value)),
            Some(PromiseState::Rejected(value)) => PromiseOutcome::Rejected(heap.export(&value)),
            _ => PromiseOutcome::Pending,
        })
    }

    /// Serialize a value to JSON
    pub fn to_json(&self, value: &ScriptValue) -> HostResult<String> {
        self.check_turn("to_json");
        let heap = self.heap.lock();
        let value = heap.import(value)?;
        let json = heap.to_json(&value, 0)?.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::to_string(&json)?)
    }

    fn promise_id(heap: &Heap, promise: &RawHandle) -> HostResult<ObjectId> {
        let id = heap.resolve_handle(promise)?;
        match heap.promise_state(id) {
            Some(_) => Ok(id),
            None => Err(HostError::type_error("Promise", "object")),
        }
    }

    fn require_promises(&self) -> HostResult<()> {
        if self.supports_promises() {
            Ok(())
        } else {
            Err(HostError::NotSupported(format!(
                "promises require language version 6 ({} implements {})",
                self.config.name, self.config.language_version
            )))
        }
    }

    fn alloc_handle(&self, operation: &str, object: HeapObject) -> RawHandle {
        self.check_turn(operation);
        let mut heap = self.heap.lock();
        let id = heap.alloc(object);
        heap.new_handle(id)
    }

    fn check_turn(&self, operation: &str) {
        if !self.in_turn() {
            self.stats.unsynchronized_calls.fetch_add(1, Ordering::Relaxed);
            warn!(engine = %self.id, operation, "engine accessed outside of an exclusive turn");
        }
    }

    fn object_id(&self, handle: &RawHandle) -> HostResult<ObjectId> {
        self.heap.lock().resolve_handle(handle)
    }

    fn import_args(&self, args: &[ScriptValue]) -> HostResult<Vec<Value>> {
        let heap = self.heap.lock();
        args.iter().map(|arg| heap.import(arg)).collect()
    }

    fn throw_new(&self, name: &str, message: &str, execution_started: bool) -> Thrown {
        let id = self.heap.lock().new_error(name, message, None, None);
        Thrown {
            value: Value::Object(id),
            execution_started,
        }
    }

    fn throw_host(&self, error: &HostError) -> Thrown {
        let id = self.heap.lock().error_from_host(error);
        Thrown {
            value: Value::Object(id),
            execution_started: true,
        }
    }

    fn to_host_error(&self, thrown: Thrown) -> HostError {
        let (name, message, stack, cause) = self.heap.lock().error_details(&thrown.value);
        HostError::Script {
            name,
            message,
            stack,
            execution_started: thrown.execution_started,
            cause,
        }
    }

    fn finish(&self, result: CallResult) -> HostResult<ScriptValue> {
        match result {
            Ok(value) => Ok(self.heap.lock().export(&value)),
            Err(thrown) => Err(self.to_host_error(thrown)),
        }
    }

    /// Call `callee`; the heap lock is never held while user code runs
    fn call(&self, callee: Value, this: Value, args: Vec<Value>, construct: bool) -> CallResult {
        let target = {
            let heap = self.heap.lock();
            match &callee {
                Value::Object(id) => match &heap.object(*id).kind {
                    Kind::Function(callable) => Some(Target::Script(callable.clone())),
                    _ => None,
                },
                Value::Host(HostObject::Function(func)) => Some(Target::Host(func.clone())),
                _ => None,
            }
        };
        let Some(target) = target else {
            let message = format!("{} is not a function", self.heap.lock().display(&callee));
            return Err(self.throw_new("TypeError", &message, false));
        };

        let this = if construct {
            Value::Object(self.heap.lock().alloc(HeapObject::new(Kind::Ordinary)))
        } else {
            this
        };

        let result = match target {
            Target::Host(func) => self.call_host(&func, &args),
            Target::Script(Callable::Native { func, .. }) => self.call_native(&func, this.clone(), &args),
            Target::Script(Callable::Resolving {
                promise,
                reject,
                done,
            }) => {
                if !done.swap(true, Ordering::SeqCst) {
                    let value = args.into_iter().next().unwrap_or(Value::Undefined);
                    let mut heap = self.heap.lock();
                    if reject {
                        heap.settle(promise, true, value);
                    } else {
                        heap.resolve_promise(promise, value);
                    }
                }
                Ok(Value::Undefined)
            }
        };

        match result {
            Ok(Value::Object(id)) => Ok(Value::Object(id)),
            Ok(_) if construct => Ok(this),
            other => other,
        }
    }

    /// Host callee: arguments are handed over as fresh handles the host owns
    fn call_host(&self, func: &HostFunction, args: &[Value]) -> CallResult {
        let args: Vec<ScriptValue> = {
            let mut heap = self.heap.lock();
            args.iter().map(|arg| heap.export(arg)).collect()
        };
        trace!(engine = %self.id, function = func.name(), "calling host function");
        match func.call(args) {
            Ok(result) => self
                .heap
                .lock()
                .import(&result)
                .map_err(|e| self.throw_host(&e)),
            Err(error) => Err(self.throw_host(&error)),
        }
    }

    fn call_native(&self, func: &NativeFn, this: Value, args: &[Value]) -> CallResult {
        let (this, args, slots) = {
            let mut heap = self.heap.lock();
            let this = heap.export(&this);
            let args: Vec<ScriptValue> = args.iter().map(|arg| heap.export(arg)).collect();
            let slots: Vec<u64> = std::iter::once(&this)
                .chain(args.iter())
                .filter_map(|value| value.as_handle().map(RawHandle::raw))
                .collect();
            (this, args, slots)
        };

        let result = func(self, this, args);

        let mut heap = self.heap.lock();
        let outcome = match result {
            Ok(value) => {
                let imported = heap.import(&value);
                if let Some(handle) = value.as_handle() {
                    heap.drop_handle(handle.raw());
                }
                imported
            }
            Err(error) => Err(error),
        };
        for slot in slots {
            heap.drop_handle(slot);
        }
        drop(heap);
        outcome.map_err(|error| self.throw_host(&error))
    }

    /// Intrinsic methods of arrays and promises
    fn call_builtin(&self, id: ObjectId, name: &str, args: Vec<Value>) -> Option<CallResult> {
        let mut heap = self.heap.lock();
        match (&mut heap.object_mut(id).kind, name) {
            (Kind::Array(items), "push") => {
                items.extend(args);
                Some(Ok(Value::Number(items.len() as f64)))
            }
            (Kind::Array(items), "indexOf") => {
                let needle = args.into_iter().next().unwrap_or(Value::Undefined);
                let index = items
                    .iter()
                    .position(|item| item.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64);
                Some(Ok(Value::Number(index)))
            }
            (Kind::Array(items), "splice") => {
                let len = items.len() as i64;
                let start = args.first().and_then(Value::to_integer).unwrap_or(0);
                let start = if start < 0 { (len + start).max(0) } else { start.min(len) };
                let delete = match args.get(1) {
                    None => len - start,
                    Some(count) => count.to_integer().unwrap_or(0).clamp(0, len - start),
                };
                let range = start as usize..(start + delete) as usize;
                let removed: Vec<Value> = items.splice(range, args.into_iter().skip(2)).collect();
                let removed = heap.alloc(HeapObject::new(Kind::Array(removed)));
                Some(Ok(Value::Object(removed)))
            }
            (Kind::Promise(_), "then") => {
                let mut args = args.into_iter();
                let on_fulfilled = args.next().unwrap_or(Value::Undefined);
                let on_rejected = args.next().unwrap_or(Value::Undefined);
                let derived = heap.then(id, on_fulfilled, on_rejected);
                Some(Ok(Value::Object(derived)))
            }
            (_, "toString") => {
                let text = heap.display(&Value::Object(id));
                Some(Ok(Value::String(Arc::from(text))))
            }
            _ => None,
        }
    }

    fn drain_microtasks(&self) {
        loop {
            let Some(job) = self.heap.lock().jobs.pop_front() else {
                break;
            };
            self.run_job(job);
        }
    }

    fn run_job(&self, job: Job) {
        let Job {
            reaction,
            rejected,
            value,
        } = job;
        let handler = if rejected {
            reaction.on_rejected
        } else {
            reaction.on_fulfilled
        };
        let callable = self.heap.lock().is_callable(&handler);
        let outcome = if callable {
            self.call(handler, Value::Undefined, vec![value], false)
        } else if rejected {
            Err(Thrown {
                value,
                execution_started: true,
            })
        } else {
            Ok(value)
        };

        match (reaction.derived, outcome) {
            (Some(derived), Ok(value)) => self.heap.lock().resolve_promise(derived, value),
            (Some(derived), Err(thrown)) => self.heap.lock().settle(derived, true, thrown.value),
            (None, Err(thrown)) => {
                let message = self.heap.lock().display(&thrown.value);
                debug!(engine = %self.id, %message, "unhandled rejection in promise reaction");
            }
            (None, Ok(_)) => {}
        }
    }
}

impl EngineHost for MemoryEngine {
    fn engine_id(&self) -> EngineId {
        self.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn language_version(&self) -> u32 {
        self.config.language_version
    }

    fn run_exclusive(&self, f: &mut dyn FnMut()) {
        self.exclusive(|_| f())
    }

    fn object_info(&self, handle: &RawHandle) -> HostResult<ObjectInfo> {
        self.check_turn("object_info");
        let heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        Ok(heap.info(id))
    }

    fn identity_hash(&self, handle: &RawHandle) -> HostResult<i32> {
        self.check_turn("identity_hash");
        let id = self.object_id(handle)?;
        Ok((id as u32).wrapping_mul(0x9e37_79b9) as i32)
    }

    fn get_property(&self, handle: &RawHandle, name: &str) -> HostResult<ScriptValue> {
        self.check_turn("get_property");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        let value = heap.get(id, name)?;
        Ok(heap.export(&value))
    }

    fn try_get_property(&self, handle: &RawHandle, name: &str) -> HostResult<Option<ScriptValue>> {
        self.check_turn("try_get_property");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        if !heap.has_own(id, name) {
            return Ok(None);
        }
        let value = heap.get(id, name)?;
        Ok(Some(heap.export(&value)))
    }

    fn set_property(&self, handle: &RawHandle, name: &str, value: &ScriptValue) -> HostResult<()> {
        self.check_turn("set_property");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        let value = heap.import(value)?;
        heap.set(id, name, value)
    }

    fn delete_property(&self, handle: &RawHandle, name: &str) -> HostResult<bool> {
        self.check_turn("delete_property");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        heap.delete(id, name)
    }

    fn get_index(&self, handle: &RawHandle, index: u32) -> HostResult<ScriptValue> {
        self.check_turn("get_index");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        let value = heap.get_index(id, index)?;
        Ok(heap.export(&value))
    }

    fn set_index(&self, handle: &RawHandle, index: u32, value: &ScriptValue) -> HostResult<()> {
        self.check_turn("set_index");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        let value = heap.import(value)?;
        heap.set_index(id, index, value)
    }

    fn delete_index(&self, handle: &RawHandle, index: u32) -> HostResult<bool> {
        self.check_turn("delete_index");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        heap.delete_index(id, index)
    }

    fn property_names(&self, handle: &RawHandle, include_indices: bool) -> HostResult<Vec<String>> {
        self.check_turn("property_names");
        let heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        Ok(heap.own_keys(id, include_indices))
    }

    fn property_indices(&self, handle: &RawHandle) -> HostResult<Vec<u32>> {
        self.check_turn("property_indices");
        let heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        Ok(heap.own_indices(id))
    }

    fn invoke(
        &self,
        handle: &RawHandle,
        as_constructor: bool,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue> {
        self.check_turn("invoke");
        let callee = Value::Object(self.object_id(handle)?);
        let args = self.import_args(args)?;
        let result = self.call(callee, Value::Undefined, args, as_constructor);
        self.finish(result)
    }

    fn invoke_method(
        &self,
        handle: &RawHandle,
        name: &str,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue> {
        self.check_turn("invoke_method");
        let (id, method) = {
            let heap = self.heap.lock();
            let id = heap.resolve_handle(handle)?;
            (id, heap.get(id, name)?)
        };
        let args = self.import_args(args)?;

        let callable = self.heap.lock().is_callable(&method);
        let result = if callable {
            self.call(method, Value::Object(id), args, false)
        } else {
            match self.call_builtin(id, name, args) {
                Some(result) => result,
                None => Err(self.throw_new("TypeError", &format!("{} is not a function", name), false)),
            }
        };
        self.finish(result)
    }

    fn invoke_as_method(
        &self,
        holder: &RawHandle,
        method: &RawHandle,
        args: &[ScriptValue],
    ) -> HostResult<ScriptValue> {
        self.check_turn("invoke_as_method");
        let this = Value::Object(self.object_id(holder)?);
        let method = Value::Object(self.object_id(method)?);
        let args = self.import_args(args)?;
        let result = self.call(method, this, args, false);
        self.finish(result)
    }

    fn buffer_info(&self, handle: &RawHandle) -> HostResult<BufferInfo> {
        self.check_turn("buffer_info");
        let mut heap = self.heap.lock();
        let id = heap.resolve_handle(handle)?;
        match &heap.object(id).kind {
            Kind::ArrayBuffer { len, .. } => Ok(BufferInfo {
                offset: 0,
                size: *len,
                length: *len,
                buffer: None,
            }),
            Kind::View {
                kind,
                buffer,
                offset,
                length,
            } => {
                let (size, offset, length, buffer) = (length * kind.element_size(), *offset, *length, *buffer);
                Ok(BufferInfo {
                    offset,
                    size,
                    length,
                    buffer: Some(heap.new_handle(buffer)),
                })
            }
            _ => Err(HostError::type_error("array buffer or view", "object")),
        }
    }

    fn with_buffer_data(&self, handle: &RawHandle, f: &mut dyn FnMut(&mut [u8])) -> HostResult<()> {
        self.check_turn("with_buffer_data");
        let (buffer, offset, size, bytes) = {
            let mut heap = self.heap.lock();
            let id = heap.resolve_handle(handle)?;
            let (buffer, offset, size) = heap.byte_region(id)?;
            (buffer, offset, size, heap.check_out(buffer)?)
        };
        let mut bytes = scopeguard::guard(bytes, |bytes| self.heap.lock().check_in(buffer, bytes));
        f(&mut bytes.as_mut_slice()[offset..offset + size]);
        Ok(())
    }

    fn create_promise(&self, executor: HostFunction) -> HostResult<ScriptValue> {
        self.require_promises()?;
        self.check_turn("create_promise");
        let done = Arc::new(AtomicBool::new(false));
        let (promise, resolve, reject) = {
            let mut heap = self.heap.lock();
            let promise = heap.new_promise();
            let resolve = heap.alloc(HeapObject::new(Kind::Function(Callable::Resolving {
                promise,
                reject: false,
                done: done.clone(),
            })));
            let reject = heap.alloc(HeapObject::new(Kind::Function(Callable::Resolving {
                promise,
                reject: true,
                done: done.clone(),
            })));
            (promise, resolve, reject)
        };

        let executor = Value::Host(HostObject::Function(executor));
        let args = vec![Value::Object(resolve), Value::Object(reject)];
        if let Err(thrown) = self.call(executor, Value::Undefined, args, false) {
            if !done.swap(true, Ordering::SeqCst) {
                self.heap.lock().settle(promise, true, thrown.value);
            }
        }
        Ok(self.heap.lock().export(&Value::Object(promise)))
    }

    fn make_error(&self, error: &HostError) -> HostResult<ScriptValue> {
        self.check_turn("make_error");
        let mut heap = self.heap.lock();
        let id = heap.error_from_host(error);
        Ok(heap.export(&Value::Object(id)))
    }

    fn throw_value(&self, value: &ScriptValue) -> HostError {
        self.check_turn("throw_value");
        let value = match self.heap.lock().import(value) {
            Ok(value) => value,
            Err(error) => return error,
        };
        self.to_host_error(Thrown {
            value,
            execution_started: true,
        })
    }

    fn release(&self, handle: RawHandle) {
        self.check_turn("release");
        if self.heap.lock().drop_handle(handle.raw()) {
            self.stats.handles_released.fetch_add(1, Ordering::Relaxed);
            trace!(engine = %self.id, ?handle, "handle released");
        } else {
            warn!(engine = %self.id, ?handle, "release of unknown handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn int(value: &ScriptValue) -> i64 {
        value.as_f64().unwrap() as i64
    }

    #[test]
    fn test_object_properties() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let obj = engine.new_object();
            engine.set_property(&obj, "b", &ScriptValue::Int32(1)).unwrap();
            engine.set_property(&obj, "0", &"zero".into()).unwrap();
            engine.set_property(&obj, "a", &ScriptValue::Int32(2)).unwrap();

            assert_eq!(engine.property_names(&obj, true).unwrap(), vec!["0", "b", "a"]);
            assert_eq!(engine.property_indices(&obj).unwrap(), vec![0]);
            assert!(engine.try_get_property(&obj, "missing").unwrap().is_none());
            assert!(engine.delete_property(&obj, "a").unwrap());
            assert_eq!(engine.property_names(&obj, false).unwrap(), vec!["b"]);
            engine.release(obj);
        });
        assert_eq!(engine.stats().live_handles, 0);
        assert_eq!(engine.stats().unsynchronized_calls, 0);
    }

    #[test]
    fn test_identity_hash_is_per_object() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let a = engine.global();
            let b = engine.global();
            let c = engine.new_object();
            assert_ne!(a, b);
            assert_eq!(engine.identity_hash(&a).unwrap(), engine.identity_hash(&b).unwrap());
            assert_ne!(engine.identity_hash(&a).unwrap(), engine.identity_hash(&c).unwrap());
        });
    }

    #[test]
    fn test_array_builtins() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let arr = engine
                .new_array(&[ScriptValue::Int32(1), ScriptValue::Int32(2), ScriptValue::Int32(3)]).unwrap();
            let len = engine.invoke_method(&arr, "push", &[ScriptValue::Int32(4)]).unwrap();
            assert_eq!(int(&len), 4);

            let index = engine.invoke_method(&arr, "indexOf", &[ScriptValue::Int32(3)]).unwrap();
            assert_eq!(int(&index), 2);

            let removed = engine
                .invoke_method(&arr, "splice", &[ScriptValue::Int32(1), ScriptValue::Int32(2), "x".into()])
                .unwrap();
            let removed = removed.as_handle().unwrap();
            assert_eq!(int(&engine.get_property(removed, "length").unwrap()), 2);
            assert_eq!(engine.to_json(&ScriptValue::Object(RawHandle::from_raw(arr.raw()))).unwrap(), r#"[1,"x",4]"#);
        });
    }

    #[test]
    fn test_native_function_receives_this() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let obj = engine.new_object();
            engine.set_property(&obj, "base", &ScriptValue::Int32(10)).unwrap();
            let add = engine.new_function("add", |engine, this, args| {
                let base = engine.get_property(this.as_handle().unwrap(), "base")?;
                Ok(ScriptValue::Number(base.as_f64().unwrap_or(0.0) + args[0].as_f64().unwrap_or(0.0)))
            });
            let add_value = ScriptValue::Object(RawHandle::from_raw(add.raw()));
            engine.set_property(&obj, "add", &add_value).unwrap();

            let result = engine.invoke_method(&obj, "add", &[ScriptValue::Int32(5)]).unwrap();
            assert_eq!(int(&result), 15);

            let result = engine.invoke_as_method(&obj, &add, &[ScriptValue::Int32(1)]).unwrap();
            assert_eq!(int(&result), 11);
        });
    }

    #[test]
    fn test_thrown_errors() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let fail = engine.new_function("fail", |_, _, _| {
                Err(HostError::script_error("RangeError", "out of range"))
            });
            let err = engine.invoke(&fail, false, &[]).unwrap_err();
            assert_eq!(err.error_type(), "RangeError");
            assert_eq!(err.message(), "out of range");
            assert!(err.execution_started());

            let obj = engine.new_object();
            let err = engine.invoke(&obj, false, &[]).unwrap_err();
            assert_eq!(err.error_type(), "TypeError");
            assert!(!err.execution_started());

            let err = engine.invoke_method(&obj, "nothing", &[]).unwrap_err();
            assert!(err.message().contains("nothing is not a function"));
        });
    }

    #[test]
    fn test_host_error_cause_survives_round_trip() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let error = engine.make_error(&HostError::internal("disk on fire")).unwrap();
            let thrown = engine.throw_value(&error);
            assert_eq!(thrown.error_type(), "InternalError");
            let cause = thrown.cause().unwrap();
            assert!(cause.to_string().contains("disk on fire"));
        });
    }

    #[test]
    fn test_constructor_creates_object() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let ctor = engine.new_function("Point", |engine, this, args| {
                let this = this.as_handle().unwrap();
                engine.set_property(this, "x", &args[0].as_f64().unwrap_or(0.0).into())?;
                Ok(ScriptValue::Undefined)
            });
            let point = engine.invoke(&ctor, true, &[ScriptValue::Int32(3)]).unwrap();
            let point = point.as_handle().unwrap();
            assert_eq!(int(&engine.get_property(point, "x").unwrap()), 3);
        });
    }

    #[test]
    fn test_typed_array_views() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let buffer = engine.new_array_buffer(vec![0; 16]);
            let view = engine.new_typed_array(BufferKind::Int32, &buffer, 4, 2).unwrap();

            let info = engine.buffer_info(&view).unwrap();
            assert_eq!((info.offset, info.size, info.length), (4, 8, 2));
            engine.release(info.buffer.unwrap());

            engine
                .with_buffer_data(&view, &mut |bytes| {
                    bytes[..4].copy_from_slice(&7i32.to_ne_bytes());
                })
                .unwrap();
            assert_eq!(int(&engine.get_index(&view, 0).unwrap()), 7);

            assert!(engine.new_typed_array(BufferKind::Int32, &buffer, 2, 1).is_err());
            assert!(engine.new_typed_array(BufferKind::Float64, &buffer, 8, 2).is_err());
            assert!(engine.new_data_view(&buffer, 0, 16).is_ok());
        });
    }

    #[test]
    fn test_nested_buffer_access_is_rejected() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let buffer = engine.new_array_buffer(vec![1, 2, 3]);
            let mut inner = None;
            engine
                .with_buffer_data(&buffer, &mut |_| {
                    inner = Some(engine.with_buffer_data(&buffer, &mut |_| {}));
                })
                .unwrap();
            assert!(matches!(inner, Some(Err(HostError::Buffer(_)))));

            // contents are restored afterwards
            engine
                .with_buffer_data(&buffer, &mut |bytes| assert_eq!(bytes, &[1, 2, 3]))
                .unwrap();
        });
    }

    #[test]
    fn test_shared_flag_propagates_to_views() {
        let engine = MemoryEngine::new();
        engine.exclusive(|engine| {
            let buffer = engine.new_shared_array_buffer(8);
            let view = engine.new_typed_array(BufferKind::Uint8, &buffer, 0, 8).unwrap();
            assert!(engine.object_info(&buffer).unwrap().is_shared());
            assert!(engine.object_info(&view).unwrap().is_shared());
        });
    }

    #[test]
    fn test_promise_reactions_run_at_turn_end() {
        let engine = MemoryEngine::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let promise = engine.exclusive(|engine| {
            let promise = engine.new_promise().unwrap();
            let sink = seen.clone();
            let on_fulfilled = engine.new_function("onFulfilled", move |_, _, args| {
                sink.store(args[0].as_f64().unwrap_or(0.0) as usize, Ordering::SeqCst);
                Ok(ScriptValue::Undefined)
            });
            let on_fulfilled = ScriptValue::Object(on_fulfilled);
            engine.invoke_method(&promise, "then", &[on_fulfilled]).unwrap();
            engine.resolve_promise(&promise, &ScriptValue::Int32(42)).unwrap();
            assert_eq!(seen.load(Ordering::SeqCst), 0);
            promise
        });

        assert_eq!(seen.load(Ordering::SeqCst), 42);
        engine.exclusive(|engine| {
            let outcome = engine.promise_outcome(&promise).unwrap();
            assert!(matches!(outcome, PromiseOutcome::Fulfilled(ScriptValue::Int32(42))));
        });
    }

    #[test]
    fn test_create_promise_with_host_executor() {
        let engine = Arc::new(MemoryEngine::new());
        let captured = Arc::new(parking_lot::Mutex::new(None));

        let promise = engine.exclusive(|engine| {
            let slot = captured.clone();
            let executor = HostFunction::new("executor", move |mut args| {
                args.truncate(1);
                *slot.lock() = args.pop();
                Ok(ScriptValue::Undefined)
            });
            let promise = engine.create_promise(executor).unwrap();
            let resolve = captured.lock().take().unwrap();
            engine
                .invoke(resolve.as_handle().unwrap(), false, &["done".into()])
                .unwrap();
            promise
        });

        engine.exclusive(|engine| {
            let outcome = engine.promise_outcome(promise.as_handle().unwrap()).unwrap();
            match outcome {
                PromiseOutcome::Fulfilled(value) => assert_eq!(value.as_str(), Some("done")),
                other => panic!("unexpected {:?}", other),
            }
        });
    }

    #[test]
    fn test_promises_need_language_version() {
        let engine = MemoryEngine::builder().language_version(5).build();
        engine.exclusive(|engine| {
            assert!(!engine.supports_promises());
            assert!(matches!(engine.new_promise(), Err(HostError::NotSupported(_))));
        });
    }

    #[test]
    fn test_unsynchronized_calls_are_counted() {
        let engine = MemoryEngine::new();
        let obj = engine.new_object();
        assert!(!engine.in_turn());
        assert_eq!(engine.stats().unsynchronized_calls, 1);
        engine.exclusive(|engine| {
            assert!(engine.in_turn());
            engine.release(obj);
        });
        assert_eq!(engine.stats().unsynchronized_calls, 1);
    }

    #[test]
    fn test_config_from_json() {
        let config = MemoryEngineConfig::from_json(r#"{"name": "test"}"#).unwrap();
        assert_eq!(config.name, "test");
        assert_eq!(config.language_version, 11);
        assert!(MemoryEngineConfig::from_json("{").is_err());
    }
}
