//! Proxy wrappers for engine objects
//!
//! Every proxy variant is a thin handle onto one shared [`ProxyCore`], which
//! owns the engine handle. Clones of a proxy share the core; the handle is
//! released once, when the proxy is disposed or the last clone is dropped.
//!
//! Two proxies are equal when they come from the same engine and the engine
//! reports the same identity hash for their handles, so independently
//! wrapped handles to one object compare equal.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use tracing::trace;

use otter_host::{EngineHost, EngineId, ObjectFlags, ObjectInfo, ObjectKind, RawHandle};

use crate::buffer::BufferDescriptor;
use crate::engine::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::factory;
use crate::value::HostValue;

/// Shared state behind every proxy
pub struct ProxyCore {
    bridge: Bridge,
    handle: RawHandle,
    info: ObjectInfo,
    identity: i32,
    disposed: AtomicBool,
    /// Proxy this one was read from as a property; never owning
    holder: RwLock<Weak<ProxyCore>>,
    pub(crate) descriptor: OnceLock<BufferDescriptor>,
}

impl ProxyCore {
    pub(crate) fn new(bridge: Bridge, handle: RawHandle, info: ObjectInfo, identity: i32) -> Self {
        Self {
            bridge,
            handle,
            info,
            identity,
            disposed: AtomicBool::new(false),
            holder: RwLock::new(Weak::new()),
            descriptor: OnceLock::new(),
        }
    }

    pub(crate) fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub(crate) fn info(&self) -> ObjectInfo {
        self.info
    }

    /// The live handle, or a disposed-object fault
    pub(crate) fn handle(&self) -> BridgeResult<&RawHandle> {
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }
        Ok(&self.handle)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Run `f` on the engine's turn with the live handle
    pub(crate) fn exclusive<R>(
        &self,
        f: impl FnOnce(&dyn EngineHost, &RawHandle) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        self.bridge.exclusive(|host| {
            let handle = self.handle()?;
            f(host, handle)
        })
    }

    /// Mark disposed and hand the handle back; later calls are no-ops
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.bridge.record_disposed();
        trace!(handle = ?self.handle, kind = ?self.info.kind, "proxy disposed");
        // the core keeps its own token but never uses it again
        self.bridge.release(RawHandle::from_raw(self.handle.raw()));
    }

    pub(crate) fn set_holder(&self, holder: &Arc<ProxyCore>) {
        *self.holder.write() = Arc::downgrade(holder);
    }

    /// The recorded holder, if it is still alive
    pub(crate) fn holder(&self) -> Option<Arc<ProxyCore>> {
        self.holder
            .read()
            .upgrade()
            .filter(|holder| !holder.is_disposed())
    }

    fn same_identity(&self, other: &ProxyCore) -> bool {
        self.identity == other.identity && self.bridge.engine_id() == other.bridge.engine_id()
    }

    fn hash_identity<H: Hasher>(&self, state: &mut H) {
        self.bridge.engine_id().hash(state);
        self.identity.hash(state);
    }
}

impl Drop for ProxyCore {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ProxyCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCore")
            .field("engine", &self.bridge.engine_id())
            .field("identity", &self.identity)
            .field("kind", &self.info.kind)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Operations shared by every proxy variant
///
/// Each operation fails with [`BridgeError::Disposed`] once the proxy has
/// been disposed, and runs on the engine's turn.
pub trait ForeignObject {
    #[doc(hidden)]
    fn core(&self) -> &Arc<ProxyCore>;

    /// Bridge this proxy was created by
    fn bridge(&self) -> &Bridge {
        self.core().bridge()
    }

    fn engine_id(&self) -> EngineId {
        self.core().bridge().engine_id()
    }

    fn kind(&self) -> ObjectKind {
        self.core().info().kind
    }

    fn flags(&self) -> ObjectFlags {
        self.core().info().flags
    }

    fn is_shared(&self) -> bool {
        self.core().info().is_shared()
    }

    fn is_promise(&self) -> bool {
        self.core().info().is_promise()
    }

    /// Engine-assigned identity hash
    fn identity_hash(&self) -> i32 {
        self.core().identity
    }

    fn is_disposed(&self) -> bool {
        self.core().is_disposed()
    }

    /// Release the engine handle
    ///
    /// Affects every clone of this proxy. Disposing twice is a no-op.
    fn dispose(&self) {
        self.core().dispose();
    }

    /// Proxy this one was read from, if it is still alive
    fn holder(&self) -> Option<Proxy> {
        self.core().holder().map(factory::classify)
    }

    /// Same object as a [`Proxy`]
    fn to_proxy(&self) -> Proxy {
        factory::classify(self.core().clone())
    }

    /// Read a named property
    ///
    /// Object and array results record this proxy as their holder.
    fn get_property(&self, name: &str) -> BridgeResult<HostValue> {
        let core = self.core();
        core.exclusive(|host, handle| {
            let value = host.get_property(handle, name)?;
            core.bridge().marshaler(host).to_host_property(value, core)
        })
    }

    fn set_property(&self, name: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        let value = value.into();
        self.core().exclusive(|host, handle| {
            let value = self.bridge().marshaler(host).to_foreign(&value)?;
            Ok(host.set_property(handle, name, &value)?)
        })
    }

    fn delete_property(&self, name: &str) -> BridgeResult<bool> {
        self.core()
            .exclusive(|host, handle| Ok(host.delete_property(handle, name)?))
    }

    fn get_index(&self, index: u32) -> BridgeResult<HostValue> {
        self.core().exclusive(|host, handle| {
            let value = host.get_index(handle, index)?;
            self.bridge().marshaler(host).to_host(value, false)
        })
    }

    fn set_index(&self, index: u32, value: impl Into<HostValue>) -> BridgeResult<()> {
        let value = value.into();
        self.core().exclusive(|host, handle| {
            let value = self.bridge().marshaler(host).to_foreign(&value)?;
            Ok(host.set_index(handle, index, &value)?)
        })
    }

    fn delete_index(&self, index: u32) -> BridgeResult<bool> {
        self.core()
            .exclusive(|host, handle| Ok(host.delete_index(handle, index)?))
    }

    /// Enumerable own property names, without integer indices
    fn property_names(&self) -> BridgeResult<Vec<String>> {
        self.core()
            .exclusive(|host, handle| Ok(host.property_names(handle, false)?))
    }

    /// Enumerable own integer indices
    fn property_indices(&self) -> BridgeResult<Vec<u32>> {
        self.core()
            .exclusive(|host, handle| Ok(host.property_indices(handle)?))
    }

    /// Call the object as a function or constructor
    ///
    /// A plain call on a proxy with a live holder runs with the holder as
    /// receiver, as if invoked as `holder.method(...)`.
    fn invoke(&self, as_constructor: bool, args: &[HostValue]) -> BridgeResult<HostValue> {
        let core = self.core();
        core.exclusive(|host, handle| {
            let marshaler = core.bridge().marshaler(host);
            let args = marshaler.to_foreign_args(args)?;
            let holder = if as_constructor { None } else { core.holder() };
            core.bridge().record_call();
            let result = match &holder {
                Some(holder) => host.invoke_as_method(holder.handle()?, handle, &args)?,
                None => host.invoke(handle, as_constructor, &args)?,
            };
            marshaler.to_host(result, false)
        })
    }

    /// Plain call (`invoke(false, args)`)
    fn call(&self, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.invoke(false, args)
    }

    /// Constructor call (`invoke(true, args)`)
    fn construct(&self, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.invoke(true, args)
    }

    /// Call the method `name` with this object as receiver
    fn invoke_method(&self, name: &str, args: &[HostValue]) -> BridgeResult<HostValue> {
        self.core().exclusive(|host, handle| {
            let marshaler = self.bridge().marshaler(host);
            let args = marshaler.to_foreign_args(args)?;
            self.bridge().record_call();
            let result = host.invoke_method(handle, name, &args)?;
            marshaler.to_host(result, false)
        })
    }

    /// Call the method `name`, discarding the result without marshaling it
    fn invoke_method_raw(&self, name: &str, args: &[HostValue]) -> BridgeResult<()> {
        self.core().exclusive(|host, handle| {
            let marshaler = self.bridge().marshaler(host);
            let args = marshaler.to_foreign_args(args)?;
            self.bridge().record_call();
            let result = host.invoke_method(handle, name, &args)?;
            marshaler.discard(result);
            Ok(())
        })
    }
}

macro_rules! proxy_variant {
    ($(#[$meta:meta])* $name:ident => $variant:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            core: Arc<ProxyCore>,
        }

        impl $name {
            pub(crate) fn from_core(core: Arc<ProxyCore>) -> Self {
                Self { core }
            }
        }

        impl ForeignObject for $name {
            fn core(&self) -> &Arc<ProxyCore> {
                &self.core
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("engine", &self.core.bridge.engine_id())
                    .field("identity", &self.core.identity)
                    .field("disposed", &self.core.is_disposed())
                    .finish()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.core.same_identity(&other.core)
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.core.hash_identity(state);
            }
        }

        impl From<$name> for Proxy {
            fn from(proxy: $name) -> Self {
                Proxy::$variant(proxy)
            }
        }
    };
}

proxy_variant!(
    /// Ordinary object, function, or any object without a special shape
    ScriptObject => Object
);
proxy_variant!(
    /// Array exposed as an ordered sequence
    ScriptArray => Array
);
proxy_variant!(
    /// Promise; see [`ScriptPromise::into_task`]
    ScriptPromise => Promise
);
proxy_variant!(
    /// Raw array buffer
    ArrayBufferProxy => ArrayBuffer
);
proxy_variant!(
    /// Data view over an array buffer
    DataViewProxy => DataView
);
proxy_variant!(
    /// Typed array of any element kind
    TypedArrayProxy => TypedArray
);

/// A proxy of any variant
///
/// The variant is fixed by the factory from the handle's capability flags.
#[derive(Clone, Debug)]
pub enum Proxy {
    Object(ScriptObject),
    Array(ScriptArray),
    Promise(ScriptPromise),
    ArrayBuffer(ArrayBufferProxy),
    DataView(DataViewProxy),
    TypedArray(TypedArrayProxy),
}

impl Proxy {
    /// Variant name, for diagnostics
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Promise(_) => "promise",
            Self::ArrayBuffer(_) => "array buffer",
            Self::DataView(_) => "data view",
            Self::TypedArray(_) => "typed array",
        }
    }

    pub fn as_object(&self) -> Option<&ScriptObject> {
        match self {
            Self::Object(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ScriptArray> {
        match self {
            Self::Array(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&ScriptPromise> {
        match self {
            Self::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_array_buffer(&self) -> Option<&ArrayBufferProxy> {
        match self {
            Self::ArrayBuffer(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_data_view(&self) -> Option<&DataViewProxy> {
        match self {
            Self::DataView(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_typed_array(&self) -> Option<&TypedArrayProxy> {
        match self {
            Self::TypedArray(p) => Some(p),
            _ => None,
        }
    }
}

impl ForeignObject for Proxy {
    fn core(&self) -> &Arc<ProxyCore> {
        match self {
            Self::Object(p) => p.core(),
            Self::Array(p) => p.core(),
            Self::Promise(p) => p.core(),
            Self::ArrayBuffer(p) => p.core(),
            Self::DataView(p) => p.core(),
            Self::TypedArray(p) => p.core(),
        }
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.core().same_identity(other.core())
    }
}

impl Eq for Proxy {}

impl Hash for Proxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.core().hash_identity(state);
    }
}
