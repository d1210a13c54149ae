//! Proxy construction
//!
//! The variant of a proxy is chosen once, from the capability flags the
//! engine reports for its handle:
//!
//! 1. arrays become [`ScriptArray`];
//! 2. objects without contiguous bytes become [`ScriptPromise`] when the
//!    kind is promise, otherwise [`ScriptObject`];
//! 3. buffers and views are split by buffer kind, and a buffer kind the
//!    engine cannot classify falls back to [`ScriptObject`].

use std::sync::Arc;

use tracing::{debug, trace};

use otter_host::{BufferKind, EngineHost, ObjectInfo, RawHandle};

use crate::engine::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{
    ArrayBufferProxy, DataViewProxy, Proxy, ProxyCore, ScriptArray, ScriptObject, ScriptPromise,
    TypedArrayProxy,
};

/// Wrap an engine handle in the proxy variant its flags call for
///
/// `None` yields `None`. Must run on the engine's turn, with `host` being
/// the engine `bridge` is bound to.
pub fn wrap(
    bridge: &Bridge,
    host: &dyn EngineHost,
    handle: Option<RawHandle>,
) -> BridgeResult<Option<Proxy>> {
    handle.map(|handle| wrap_handle(bridge, host, handle)).transpose()
}

pub(crate) fn wrap_handle(
    bridge: &Bridge,
    host: &dyn EngineHost,
    handle: RawHandle,
) -> BridgeResult<Proxy> {
    if host.engine_id() != bridge.engine_id() {
        let actual = host.engine_id();
        host.release(handle);
        return Err(BridgeError::ForeignEngine {
            expected: bridge.engine_id(),
            actual,
        });
    }

    let described = host
        .object_info(&handle)
        .and_then(|info| Ok((info, host.identity_hash(&handle)?)));
    let (info, identity) = match described {
        Ok(described) => described,
        Err(e) => {
            host.release(handle);
            return Err(e.into());
        }
    };

    bridge.record_created();
    let proxy = classify(Arc::new(ProxyCore::new(bridge.clone(), handle, info, identity)));
    if info.buffer_kind.is_some() {
        debug!(variant = proxy.variant_name(), buffer_kind = ?info.buffer_kind, identity, "proxy created");
    } else {
        trace!(variant = proxy.variant_name(), identity, "proxy created");
    }
    Ok(proxy)
}

/// Pick the variant for an existing core
pub(crate) fn classify(core: Arc<ProxyCore>) -> Proxy {
    match variant_of(&core.info()) {
        Variant::Array => ScriptArray::from_core(core).into(),
        Variant::Promise => ScriptPromise::from_core(core).into(),
        Variant::Object => ScriptObject::from_core(core).into(),
        Variant::ArrayBuffer => ArrayBufferProxy::from_core(core).into(),
        Variant::DataView => DataViewProxy::from_core(core).into(),
        Variant::TypedArray => TypedArrayProxy::from_core(core).into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Object,
    Array,
    Promise,
    ArrayBuffer,
    DataView,
    TypedArray,
}

fn variant_of(info: &ObjectInfo) -> Variant {
    if info.is_array() {
        return Variant::Array;
    }
    if !info.is_buffer_or_view() {
        return if info.is_promise() {
            Variant::Promise
        } else {
            Variant::Object
        };
    }
    match info.buffer_kind {
        Some(BufferKind::ArrayBuffer) => Variant::ArrayBuffer,
        Some(BufferKind::DataView) => Variant::DataView,
        Some(_) => Variant::TypedArray,
        None => Variant::Object,
    }
}
