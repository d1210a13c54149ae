//! otter-bridge - value marshaling and proxies for embedded script engines.
//!
//! This crate sits between host code and an engine implementing
//! [`otter_host::EngineHost`]. It converts values in both directions and
//! exposes engine heap objects through typed proxies.
//!
//! # Features
//!
//! - **Proxies**: objects, arrays, promises, array buffers, data views and
//!   typed arrays, each with host-idiomatic operations
//! - **Identity**: proxies compare by engine identity, not by wrapper
//! - **Ownership**: every engine handle is released exactly once, on the
//!   engine's turn, after the last proxy clone is disposed or dropped
//! - **Direct memory**: bounds-checked access to buffer bytes, scoped to a
//!   callback
//! - **Async**: Tokio tasks become engine promises and promises become
//!   futures
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use otter_bridge::{Bridge, ForeignObject, HostValue, Proxy};
//! use otter_host::{MemoryEngine, ScriptValue};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let bridge = Bridge::new(engine.clone());
//!
//! let handle = engine
//!     .exclusive(|engine| engine.new_array(&[ScriptValue::Int32(1), ScriptValue::Int32(2)]))
//!     .unwrap();
//! let Some(Proxy::Array(array)) = bridge.wrap(Some(handle)).unwrap() else {
//!     panic!("expected an array");
//! };
//!
//! array.push(3).unwrap();
//! array.remove_at(0).unwrap();
//! assert_eq!(array.to_vec().unwrap(), vec![HostValue::Int32(2), HostValue::Int32(3)]);
//! ```
//!
//! # Architecture
//!
//! ```text
//! host code ── HostValue ──> Marshaler ── ScriptValue ──> EngineHost
//!                               │
//!                               └─ heap references ─> factory ─> Proxy
//!                                                                 │
//!                                              Arc<ProxyCore> ────┘
//!                                              (owns the RawHandle)
//! ```

mod array;
mod buffer;
mod config;
mod dispatch;
mod engine;
mod error;
pub mod factory;
mod marshal;
mod object;
mod promise;
mod proxy;
mod value;

pub use array::ArrayIter;
pub use buffer::{BufferAccess, BufferDescriptor, Element, TypedView, Utf16View};
pub use config::BridgeConfig;
pub use dispatch::{Dispatch, DispatchOp, ScriptFrame};
pub use engine::{Bridge, BridgeBuilder, BridgeStats, BridgeStatsSnapshot};
pub use error::{BridgeError, BridgeResult, HostError, HostResult};
pub use marshal::Marshaler;
pub use promise::{Completion, PromiseTask};
pub use proxy::{
    ArrayBufferProxy, DataViewProxy, ForeignObject, Proxy, ProxyCore, ScriptArray, ScriptObject,
    ScriptPromise, TypedArrayProxy,
};
pub use value::HostValue;
