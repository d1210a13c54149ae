//! Promise <-> task conversion
//!
//! Host work becomes an engine promise through
//! [`Bridge::promise_from_task`]: the promise is created with an executor
//! that captures its resolving functions, and a continuation spawned on the
//! bridge's Tokio runtime settles it as soon as the task completes.
//!
//! An engine promise becomes a [`PromiseTask`] through
//! [`Bridge::to_host_task`], which registers host callbacks through the
//! promise's `then`. Rejection reasons are re-raised through
//! [`EngineHost::throw_value`], so structured script errors survive the trip.
//!
//! [`EngineHost::throw_value`]: otter_host::EngineHost::throw_value

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use otter_host::{EngineHost, HostFunction, ScriptValue};

use crate::engine::Bridge;
use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{ForeignObject, Proxy, ScriptPromise};
use crate::value::HostValue;

/// One-shot settle cell
///
/// The first [`settle`](Self::settle) delivers its value; any later attempt
/// is a contract violation and fails with [`BridgeError::AlreadySettled`].
pub struct Completion<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Completion<T> {
    /// Create a completion and the receiver it settles
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (sender, receiver) = oneshot::channel();
        let completion = Self {
            sender: Mutex::new(Some(sender)),
        };
        (completion, receiver)
    }

    pub fn settle(&self, value: T) -> BridgeResult<()> {
        let Some(sender) = self.sender.lock().take() else {
            warn!("completion settled more than once");
            return Err(BridgeError::AlreadySettled);
        };
        if sender.send(value).is_err() {
            debug!("completion receiver dropped before settle");
        }
        Ok(())
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Host-side view of an engine promise
///
/// Resolves with the fulfillment value, or fails with the rejection reason
/// as a [`BridgeError::Host`] error. If the engine drops the promise's
/// callbacks without calling either, the task fails with
/// [`BridgeError::Cancelled`].
#[derive(Debug)]
pub struct PromiseTask {
    receiver: oneshot::Receiver<BridgeResult<HostValue>>,
}

impl PromiseTask {
    /// Outcome, if the promise has already settled
    pub fn try_take(&mut self) -> Option<BridgeResult<HostValue>> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BridgeError::Cancelled)),
        }
    }
}

impl Future for PromiseTask {
    type Output = BridgeResult<HostValue>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(BridgeError::Cancelled)))
    }
}

fn require_promises(host: &dyn EngineHost) -> BridgeResult<()> {
    if host.supports_promises() {
        Ok(())
    } else {
        Err(BridgeError::PromisesNotSupported {
            engine: host.name().to_string(),
            version: host.language_version(),
        })
    }
}

impl Bridge {
    /// Expose a spawned host task to the engine as a promise
    ///
    /// The promise fulfills with the task's value or rejects with its
    /// error. A cancelled task rejects with an `AbortError`.
    pub fn promise_from_task<T>(&self, task: JoinHandle<BridgeResult<T>>) -> BridgeResult<ScriptPromise>
    where
        T: Into<HostValue> + Send + 'static,
    {
        let (promise, resolve, reject, runtime) = self.exclusive(|host| {
            require_promises(host)?;
            let runtime = self.tokio_handle()?;

            let functions = Arc::new(Mutex::new(None));
            let executor = {
                let bridge = self.clone();
                let functions = functions.clone();
                HostFunction::new("executor", move |args| {
                    let captured = bridge
                        .exclusive(|host| {
                            let marshaler = bridge.marshaler(host);
                            let mut args = args.into_iter();
                            let mut next = || -> BridgeResult<Proxy> {
                                let arg = args.next().unwrap_or(ScriptValue::Undefined);
                                match marshaler.to_host(arg, false)? {
                                    HostValue::Proxy(function) => Ok(function),
                                    other => Err(BridgeError::type_error("function", other.type_name())),
                                }
                            };
                            Ok((next()?, next()?))
                        })
                        .map_err(BridgeError::into_host_error)?;
                    *functions.lock() = Some(captured);
                    Ok(ScriptValue::Undefined)
                })
            };

            let promise = host.create_promise(executor)?;
            let promise = match self.marshaler(host).to_host(promise, false)? {
                HostValue::Proxy(Proxy::Promise(promise)) => promise,
                other => return Err(BridgeError::type_error("promise", other.type_name())),
            };
            let (resolve, reject) = functions
                .lock()
                .take()
                .ok_or_else(|| BridgeError::runtime("promise executor was not called"))?;
            Ok((promise, resolve, reject, runtime))
        })?;

        self.record_promise();
        let bridge = self.clone();
        runtime.spawn(async move {
            let outcome: BridgeResult<HostValue> = match task.await {
                Ok(result) => result.map(Into::into),
                Err(e) if e.is_cancelled() => Err(BridgeError::Cancelled),
                Err(e) => Err(BridgeError::runtime(format!("host task failed: {}", e))),
            };
            bridge.settle_promise(&resolve, &reject, outcome);
        });
        Ok(promise)
    }

    /// Spawn `future` on the bridge's runtime and expose it as a promise
    pub fn promise_from_future<F, T>(&self, future: F) -> BridgeResult<ScriptPromise>
    where
        F: Future<Output = BridgeResult<T>> + Send + 'static,
        T: Into<HostValue> + Send + 'static,
    {
        self.exclusive(require_promises)?;
        let task = self.tokio_handle()?.spawn(future);
        self.promise_from_task(task)
    }

    /// Settle an engine promise in one turn
    fn settle_promise(&self, resolve: &Proxy, reject: &Proxy, outcome: BridgeResult<HostValue>) {
        let settled = self.exclusive(|host| match outcome {
            Ok(value) => resolve.call(&[value]).map(|_| ()),
            Err(error) => {
                debug!(error = %error, "rejecting promise");
                let reason = host.make_error(&error.into_host_error())?;
                let reason = self.marshaler(host).to_host(reason, false)?;
                reject.call(&[reason]).map(|_| ())
            }
        });
        if let Err(e) = settled {
            warn!(error = %e, "failed to settle promise");
        }
    }

    /// Observe an engine promise as a host future
    pub fn to_host_task(&self, promise: &Proxy) -> BridgeResult<PromiseTask> {
        if promise.engine_id() != self.engine_id() {
            return Err(BridgeError::ForeignEngine {
                expected: self.engine_id(),
                actual: promise.engine_id(),
            });
        }
        if !promise.is_promise() {
            return Err(BridgeError::NotAPromise);
        }

        let (completion, receiver) = Completion::new();
        let completion = Arc::new(completion);

        let on_fulfilled = {
            let bridge = self.clone();
            let completion = completion.clone();
            HostFunction::new("onFulfilled", move |args| {
                let value = args.into_iter().next().unwrap_or(ScriptValue::Undefined);
                if let Err(e) = completion.settle(bridge.wrap_value(value)) {
                    debug!(reaction = "onFulfilled", error = %e, "promise reaction ignored");
                }
                Ok(ScriptValue::Undefined)
            })
        };
        let on_rejected = {
            let bridge = self.clone();
            HostFunction::new("onRejected", move |args| {
                let reason = args.into_iter().next().unwrap_or(ScriptValue::Undefined);
                let error = bridge.exclusive(|host| {
                    let error = host.throw_value(&reason);
                    bridge.marshaler(host).discard(reason);
                    Ok(BridgeError::Host(error))
                });
                if let Err(e) = completion.settle(Err(error.unwrap_or_else(|e| e))) {
                    debug!(reaction = "onRejected", error = %e, "promise reaction ignored");
                }
                Ok(ScriptValue::Undefined)
            })
        };

        promise.invoke_method_raw("then", &[on_fulfilled.into(), on_rejected.into()])?;
        self.record_promise();
        Ok(PromiseTask { receiver })
    }
}

impl ScriptPromise {
    /// Observe this promise as a host future
    pub fn into_task(self) -> BridgeResult<PromiseTask> {
        let bridge = self.bridge().clone();
        bridge.to_host_task(&self.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_host::{MemoryEngine, PromiseOutcome};

    fn setup() -> (Arc<MemoryEngine>, Bridge) {
        let engine = Arc::new(MemoryEngine::new());
        let bridge = Bridge::new(engine.clone());
        (engine, bridge)
    }

    #[test]
    fn test_completion_settles_once() {
        let (completion, mut receiver) = Completion::new();
        assert!(!completion.is_settled());
        completion.settle(1).unwrap();
        assert!(matches!(completion.settle(2), Err(BridgeError::AlreadySettled)));
        assert_eq!(receiver.try_recv().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_task_fulfills_promise() {
        let (engine, bridge) = setup();
        let task = tokio::spawn(async { Ok::<_, BridgeError>(42) });
        let promise = bridge.promise_from_task(task).unwrap();

        let value = promise.clone().into_task().unwrap().await.unwrap();
        assert_eq!(value, HostValue::Int32(42));

        let outcome = promise
            .core()
            .exclusive(|_, handle| Ok(engine.promise_outcome(handle)?))
            .unwrap();
        match outcome {
            PromiseOutcome::Fulfilled(value) => assert_eq!(value.as_f64(), Some(42.0)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(bridge.stats().snapshot().promises_bridged, 2);
    }

    #[tokio::test]
    async fn test_task_error_rejects_promise() {
        let (_engine, bridge) = setup();
        let task = tokio::spawn(async {
            Err::<i32, _>(BridgeError::script_error("RangeError", "out of bounds"))
        });
        let promise = bridge.promise_from_task(task).unwrap();

        let err = promise.into_task().unwrap().await.unwrap_err();
        assert!(err.is_script_error());
        assert_eq!(err.error_type(), "RangeError");
        match err {
            BridgeError::Host(e) => assert_eq!(e.message(), "out of bounds"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_task_rejects_with_abort_error() {
        let (_engine, bridge) = setup();
        let task = tokio::spawn(std::future::pending::<BridgeResult<i32>>());
        task.abort();
        let promise = bridge.promise_from_task(task).unwrap();

        let err = promise.into_task().unwrap().await.unwrap_err();
        assert_eq!(err.error_type(), "AbortError");
    }

    #[tokio::test]
    async fn test_unit_task_fulfills_with_undefined() {
        let (_engine, bridge) = setup();
        let promise = bridge.promise_from_future(async { Ok::<_, BridgeError>(()) }).unwrap();
        assert!(promise.into_task().unwrap().await.unwrap().is_undefined());
    }

    #[tokio::test]
    async fn test_promises_require_capability() {
        let engine = Arc::new(MemoryEngine::builder().language_version(5).build());
        let bridge = Bridge::new(engine);
        let task = tokio::spawn(async { Ok::<_, BridgeError>(1) });

        let err = bridge.promise_from_task(task).unwrap_err();
        assert!(matches!(err, BridgeError::PromisesNotSupported { version: 5, .. }));
    }

    #[test]
    fn test_to_host_task_rejects_non_promise() {
        let (engine, bridge) = setup();
        let obj = bridge
            .wrap(Some(engine.exclusive(|engine| engine.new_object())))
            .unwrap()
            .unwrap();
        assert!(matches!(bridge.to_host_task(&obj), Err(BridgeError::NotAPromise)));
    }

    #[test]
    fn test_settled_engine_promise_is_ready() {
        let (engine, bridge) = setup();
        let handle = engine.exclusive(|engine| {
            let promise = engine.new_promise().unwrap();
            engine
                .resolve_promise(&promise, &ScriptValue::from("done"))
                .unwrap();
            promise
        });
        let promise = bridge.wrap(Some(handle)).unwrap().unwrap();

        let mut task = bridge.to_host_task(&promise).unwrap();
        assert_eq!(task.try_take().unwrap().unwrap(), HostValue::from("done"));
    }
}
