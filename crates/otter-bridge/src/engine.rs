//! Engine-bound bridge handle
//!
//! A [`Bridge`] ties the proxy layer to one [`EngineHost`]. Every proxy keeps
//! a clone of the bridge it was created by and routes all engine access
//! through [`Bridge::exclusive`], which runs on the engine's turn.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use otter_bridge::{Bridge, ForeignObject, HostValue};
//! use otter_host::MemoryEngine;
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let bridge = Bridge::new(engine.clone());
//!
//! let handle = engine.exclusive(|engine| engine.new_object());
//! let obj = bridge.wrap(Some(handle)).unwrap().unwrap();
//! obj.set_property("answer", 42).unwrap();
//! assert_eq!(obj.get_property("answer").unwrap(), HostValue::Int32(42));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use otter_host::{EngineHost, EngineId, RawHandle, ScriptValue};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::factory;
use crate::marshal::Marshaler;
use crate::proxy::Proxy;
use crate::value::HostValue;

/// Statistics about bridge operation
///
/// All counters are atomic and can be read at any time without locking.
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// Total number of proxies created by the factory
    pub proxies_created: AtomicU64,
    /// Number of proxies disposed (explicitly or by drop)
    pub proxies_disposed: AtomicU64,
    /// Number of handles handed back to the engine
    pub handles_released: AtomicU64,
    /// Number of invocations made into the engine
    pub foreign_calls: AtomicU64,
    /// Number of promise/task conversions
    pub promises_bridged: AtomicU64,
}

impl BridgeStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            proxies_created: self.proxies_created.load(Ordering::Relaxed),
            proxies_disposed: self.proxies_disposed.load(Ordering::Relaxed),
            handles_released: self.handles_released.load(Ordering::Relaxed),
            foreign_calls: self.foreign_calls.load(Ordering::Relaxed),
            promises_bridged: self.promises_bridged.load(Ordering::Relaxed),
        }
    }

    /// Get the number of proxies that are still live
    pub fn proxies_live(&self) -> u64 {
        let created = self.proxies_created.load(Ordering::Relaxed);
        let disposed = self.proxies_disposed.load(Ordering::Relaxed);
        created.saturating_sub(disposed)
    }
}

/// A point-in-time snapshot of bridge statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub proxies_created: u64,
    pub proxies_disposed: u64,
    pub handles_released: u64,
    pub foreign_calls: u64,
    pub promises_bridged: u64,
}

impl BridgeStatsSnapshot {
    /// Handles disposed but not yet released to the engine
    pub fn pending_releases(&self) -> u64 {
        self.proxies_disposed.saturating_sub(self.handles_released)
    }
}

/// Builder for creating a Bridge with custom configuration
pub struct BridgeBuilder {
    config: BridgeConfig,
    tokio_handle: Option<Handle>,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            config: BridgeConfig::default(),
            // Captured if available; async conversions need a runtime
            tokio_handle: Handle::try_current().ok(),
        }
    }
}

impl BridgeBuilder {
    /// Replace the whole configuration
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable or disable holder binding on property reads
    pub fn holder_binding(mut self, enabled: bool) -> Self {
        self.config.holder_binding = enabled;
        self
    }

    /// Release handles on disposal instead of queueing them
    pub fn eager_release(mut self, enabled: bool) -> Self {
        self.config.eager_release = enabled;
        self
    }

    /// Set the Tokio runtime handle used for async conversions
    ///
    /// By default, the builder captures the current handle via
    /// `Handle::try_current()`.
    pub fn tokio_handle(mut self, handle: Handle) -> Self {
        self.tokio_handle = Some(handle);
        self
    }

    /// Build a bridge for `host`
    pub fn build(self, host: Arc<dyn EngineHost>) -> Bridge {
        let (release_tx, release_rx) = unbounded();
        debug!(
            bridge = %self.config.name,
            engine = %host.engine_id(),
            engine_name = host.name(),
            "bridge created"
        );
        Bridge {
            inner: Arc::new(BridgeInner {
                host,
                config: self.config,
                stats: BridgeStats::new(),
                release_tx,
                release_rx,
                tokio_handle: self.tokio_handle,
            }),
        }
    }
}

struct BridgeInner {
    host: Arc<dyn EngineHost>,
    config: BridgeConfig,
    stats: BridgeStats,
    release_tx: Sender<RawHandle>,
    release_rx: Receiver<RawHandle>,
    tokio_handle: Option<Handle>,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        if self.release_rx.is_empty() {
            return;
        }
        // Last reference gone; nothing else will drain the queue
        let host = self.host.as_ref();
        let (release_rx, stats) = (&self.release_rx, &self.stats);
        host.run_exclusive(&mut || {
            while let Ok(handle) = release_rx.try_recv() {
                host.release(handle);
                stats.handles_released.fetch_add(1, Ordering::Relaxed);
            }
        });
        debug!(bridge = %self.config.name, "release queue drained on drop");
    }
}

/// Thread-safe handle to a bridged engine
///
/// Cheap to clone; all clones share configuration, statistics and the
/// release queue.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("name", &self.inner.config.name)
            .field("engine", &self.engine_id())
            .finish()
    }
}

impl Bridge {
    /// Create a bridge with default configuration
    pub fn new(host: Arc<dyn EngineHost>) -> Self {
        Self::builder().build(host)
    }

    /// Create a builder for custom configuration
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    pub fn host(&self) -> &Arc<dyn EngineHost> {
        &self.inner.host
    }

    pub fn engine_id(&self) -> EngineId {
        self.inner.host.engine_id()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    /// Get the bridge statistics
    pub fn stats(&self) -> &BridgeStats {
        &self.inner.stats
    }

    /// Run `f` on the engine's turn
    ///
    /// Queued handle releases are processed first. Calls nest on the thread
    /// that owns the turn.
    pub fn exclusive<R>(
        &self,
        f: impl FnOnce(&dyn EngineHost) -> BridgeResult<R>,
    ) -> BridgeResult<R> {
        let host = self.inner.host.as_ref();
        let mut f = Some(f);
        let mut result = None;
        host.run_exclusive(&mut || {
            self.drain_releases(host);
            if let Some(f) = f.take() {
                result = Some(f(host));
            }
        });
        result.unwrap_or_else(|| {
            Err(BridgeError::runtime(
                "engine did not run the exclusive callback",
            ))
        })
    }

    /// Release every handle queued by disposal
    pub fn flush_releases(&self) -> BridgeResult<()> {
        self.exclusive(|_| Ok(()))
    }

    /// Marshaler bound to `host`, for use inside [`exclusive`](Self::exclusive)
    pub fn marshaler<'a>(&'a self, host: &'a dyn EngineHost) -> Marshaler<'a> {
        Marshaler::new(self, host)
    }

    /// Wrap a raw handle returned by the engine
    ///
    /// `None` yields `None`. The proxy takes ownership of the handle.
    pub fn wrap(&self, handle: Option<RawHandle>) -> BridgeResult<Option<Proxy>> {
        self.exclusive(|host| factory::wrap(self, host, handle))
    }

    /// Convert an engine value, wrapping heap references in proxies
    pub fn wrap_value(&self, value: ScriptValue) -> BridgeResult<HostValue> {
        self.exclusive(|host| self.marshaler(host).to_host(value, false))
    }

    /// Queue or perform the engine-side release of a disposed handle
    pub(crate) fn release(&self, handle: RawHandle) {
        if self.inner.config.eager_release {
            let released = self.exclusive(|host| {
                host.release(handle);
                Ok(())
            });
            match released {
                Ok(()) => {
                    self.inner.stats.handles_released.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => warn!(bridge = %self.inner.config.name, error = %e, "eager release failed"),
            }
            return;
        }
        if let Err(e) = self.inner.release_tx.send(handle) {
            warn!(bridge = %self.inner.config.name, handle = ?e.0, "release queue closed");
        }
    }

    fn drain_releases(&self, host: &dyn EngineHost) {
        while let Ok(handle) = self.inner.release_rx.try_recv() {
            trace!(bridge = %self.inner.config.name, ?handle, "releasing handle");
            host.release(handle);
            self.inner.stats.handles_released.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn tokio_handle(&self) -> BridgeResult<Handle> {
        match &self.inner.tokio_handle {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current()
                .map_err(|_| BridgeError::runtime("no Tokio runtime available for async conversion")),
        }
    }

    pub(crate) fn record_created(&self) {
        self.inner.stats.proxies_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disposed(&self) {
        self.inner.stats.proxies_disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_call(&self) {
        self.inner.stats.foreign_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promise(&self) {
        self.inner.stats.promises_bridged.fetch_add(1, Ordering::Relaxed);
    }
}
