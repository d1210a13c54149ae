//! Value conversion across the engine boundary
//!
//! A [`Marshaler`] is bound to one bridge and the engine host whose turn is
//! currently running. It is only obtainable inside [`Bridge::exclusive`], so
//! every conversion happens on the engine's turn.
//!
//! Handle ownership follows the engine contract: handles received from the
//! engine become owned by the proxies wrapping them, while handles sent to
//! the engine are borrowed aliases of a live proxy's handle and must never
//! be released by the receiver.

use std::sync::Arc;

use tracing::trace;

use otter_host::{EngineHost, HostObject, RawHandle, ScriptValue};

use crate::engine::Bridge;
use crate::error::BridgeResult;
use crate::factory;
use crate::proxy::{ForeignObject, Proxy, ProxyCore};
use crate::value::HostValue;

/// Converts values between host and engine representations
pub struct Marshaler<'a> {
    bridge: &'a Bridge,
    host: &'a dyn EngineHost,
}

impl<'a> Marshaler<'a> {
    pub(crate) fn new(bridge: &'a Bridge, host: &'a dyn EngineHost) -> Self {
        Self { bridge, host }
    }

    /// Convert a host value for passing into the engine
    ///
    /// A proxy of this engine becomes a borrowed alias of its handle. A
    /// proxy of any other engine crosses as opaque host data, since its
    /// handle means nothing here.
    pub fn to_foreign(&self, value: &HostValue) -> BridgeResult<ScriptValue> {
        Ok(match value {
            HostValue::Undefined => ScriptValue::Undefined,
            HostValue::Null => ScriptValue::Null,
            HostValue::Bool(b) => ScriptValue::Boolean(*b),
            HostValue::Int32(n) => ScriptValue::Int32(*n),
            HostValue::Number(n) => ScriptValue::Number(*n),
            HostValue::BigInt(n) => ScriptValue::BigInt(*n),
            HostValue::String(s) => ScriptValue::String(s.clone()),
            HostValue::Proxy(proxy) if proxy.engine_id() == self.host.engine_id() => {
                let handle = proxy.core().handle()?;
                ScriptValue::Object(RawHandle::from_raw(handle.raw()))
            }
            HostValue::Proxy(proxy) => {
                trace!(
                    from = %proxy.engine_id(),
                    to = %self.host.engine_id(),
                    "passing proxy across engines as host object"
                );
                ScriptValue::Host(HostObject::Opaque(Arc::new(proxy.clone())))
            }
            HostValue::Object(obj) => ScriptValue::Host(obj.clone()),
        })
    }

    /// Convert an argument list; fails on the first disposed proxy
    pub fn to_foreign_args(&self, values: &[HostValue]) -> BridgeResult<Vec<ScriptValue>> {
        values.iter().map(|value| self.to_foreign(value)).collect()
    }

    /// Convert a value received from the engine
    ///
    /// Heap references are wrapped in proxies that take ownership of the
    /// handle. Opaque host data carrying a proxy from another engine is
    /// unwrapped back to that proxy unless `prefer_proxy` asks to keep the
    /// host object wrapper.
    pub fn to_host(&self, value: ScriptValue, prefer_proxy: bool) -> BridgeResult<HostValue> {
        Ok(match value {
            ScriptValue::Undefined => HostValue::Undefined,
            ScriptValue::Null => HostValue::Null,
            ScriptValue::Boolean(b) => HostValue::Bool(b),
            ScriptValue::Int32(n) => HostValue::Int32(n),
            ScriptValue::Number(n) => HostValue::Number(n),
            ScriptValue::BigInt(n) => HostValue::BigInt(n),
            ScriptValue::String(s) => HostValue::String(s),
            ScriptValue::Object(handle) => {
                HostValue::Proxy(factory::wrap_handle(self.bridge, self.host, handle)?)
            }
            ScriptValue::Host(obj) => match obj.downcast_ref::<Proxy>() {
                Some(proxy) if !prefer_proxy => HostValue::Proxy(proxy.clone()),
                _ => HostValue::Object(obj),
            },
        })
    }

    /// Convert a property value read through `holder`
    ///
    /// With holder binding enabled, object and array results remember
    /// `holder` so that calling them directly keeps it as receiver.
    pub(crate) fn to_host_property(
        &self,
        value: ScriptValue,
        holder: &Arc<ProxyCore>,
    ) -> BridgeResult<HostValue> {
        let value = self.to_host(value, false)?;
        if self.bridge.config().holder_binding
            && let HostValue::Proxy(proxy @ (Proxy::Object(_) | Proxy::Array(_))) = &value
        {
            proxy.core().set_holder(holder);
        }
        Ok(value)
    }

    /// Drop an engine value without converting it, releasing any handle
    pub fn discard(&self, value: ScriptValue) {
        if let ScriptValue::Object(handle) = value {
            self.host.release(handle);
        }
    }
}
