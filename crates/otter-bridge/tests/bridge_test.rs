//! Integration tests for the bridge against the in-process engine

use std::sync::Arc;
use std::thread;

use otter_bridge::{
    Bridge, BridgeError, BufferAccess, Dispatch, DispatchOp, ForeignObject, HostValue, Proxy,
    ScriptArray, ScriptFrame,
};
use otter_host::{BufferKind, EngineHost, MemoryEngine, RawHandle, ScriptValue};

fn setup() -> (Arc<MemoryEngine>, Bridge) {
    let engine = Arc::new(MemoryEngine::new());
    let bridge = Bridge::new(engine.clone());
    (engine, bridge)
}

/// Second, independent handle to the object behind `handle`
fn second_handle(engine: &MemoryEngine, handle: &RawHandle) -> RawHandle {
    engine.exclusive(|engine| {
        let global = engine.global();
        let alias = ScriptValue::Object(RawHandle::from_raw(handle.raw()));
        engine.set_property(&global, "__alias", &alias).unwrap();
        let copy = engine.get_property(&global, "__alias").unwrap();
        engine.delete_property(&global, "__alias").unwrap();
        engine.release(global);
        match copy {
            ScriptValue::Object(copy) => copy,
            other => panic!("unexpected {:?}", other),
        }
    })
}

fn array_of(engine: &MemoryEngine, bridge: &Bridge, items: &[HostValue]) -> ScriptArray {
    let handle = bridge
        .exclusive(|host| {
            let items = bridge.marshaler(host).to_foreign_args(items)?;
            Ok(engine.new_array(&items)?)
        })
        .unwrap();
    match bridge.wrap(Some(handle)).unwrap() {
        Some(Proxy::Array(array)) => array,
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_dispose_twice_matches_dispose_once() {
    for eager in [false, true] {
        let engine = Arc::new(MemoryEngine::new());
        let bridge = Bridge::builder().eager_release(eager).build(engine.clone());
        let proxy = bridge
            .wrap(Some(engine.exclusive(|engine| engine.new_object())))
            .unwrap()
            .unwrap();

        proxy.dispose();
        bridge.flush_releases().unwrap();
        let after_once = (bridge.stats().snapshot(), engine.stats());

        proxy.dispose();
        drop(proxy);
        bridge.flush_releases().unwrap();
        let after_twice = (bridge.stats().snapshot(), engine.stats());

        assert_eq!(after_once, after_twice);
        assert_eq!(after_twice.0.handles_released, 1);
        assert_eq!(after_twice.1.live_handles, 0);
    }
}

#[test]
fn test_independent_wraps_compare_equal() {
    let (engine, bridge) = setup();
    let first = engine.exclusive(|engine| engine.new_object());
    let second = second_handle(&engine, &first);
    assert_ne!(first.raw(), second.raw());

    let a = bridge.wrap(Some(first)).unwrap().unwrap();
    let b = bridge.wrap(Some(second)).unwrap().unwrap();
    assert_eq!(a, b);
    assert_eq!(a.identity_hash(), b.identity_hash());

    // disposing one wrapper leaves the other usable
    a.dispose();
    b.set_property("still", true).unwrap();
    assert_eq!(b.get_property("still").unwrap(), HostValue::Bool(true));
}

#[test]
fn test_proxies_from_different_engines_differ() {
    let (first, first_bridge) = setup();
    let (second, second_bridge) = setup();
    let a = first_bridge
        .wrap(Some(first.exclusive(|engine| engine.global())))
        .unwrap()
        .unwrap();
    let b = second_bridge
        .wrap(Some(second.exclusive(|engine| engine.global())))
        .unwrap()
        .unwrap();
    assert_ne!(a.engine_id(), b.engine_id());
    assert_ne!(a, b);
}

#[test]
fn test_scalar_round_trip() {
    let (_engine, bridge) = setup();
    let values = [
        HostValue::Undefined,
        HostValue::Null,
        HostValue::Bool(false),
        HostValue::Int32(i32::MIN),
        HostValue::Number(-0.5),
        HostValue::Number(f64::INFINITY),
        HostValue::BigInt(i64::MAX),
        HostValue::from(""),
        HostValue::from("unicode ✓"),
    ];

    for value in values {
        let back = bridge
            .exclusive(|host| {
                let marshaler = bridge.marshaler(host);
                let foreign = marshaler.to_foreign(&value)?;
                marshaler.to_host(foreign, false)
            })
            .unwrap();
        assert_eq!(back, value);
    }
}

#[test]
fn test_values_survive_engine_storage() {
    let (engine, bridge) = setup();
    let obj = bridge
        .wrap(Some(engine.exclusive(|engine| engine.new_object())))
        .unwrap()
        .unwrap();

    obj.set_property("flag", true).unwrap();
    obj.set_property("big", 1_i64 << 53).unwrap();
    obj.set_property("text", "otter").unwrap();
    assert_eq!(obj.get_property("flag").unwrap(), HostValue::Bool(true));
    assert_eq!(obj.get_property("big").unwrap(), HostValue::BigInt(1 << 53));
    assert_eq!(obj.get_property("text").unwrap(), HostValue::from("otter"));
}

#[test]
fn test_buffer_clamp_law() {
    let (engine, bridge) = setup();
    const SIZE: usize = 16;
    let handle = engine.exclusive(|engine| engine.new_array_buffer((0..SIZE as u8).collect()));
    let Some(Proxy::ArrayBuffer(buffer)) = bridge.wrap(Some(handle)).unwrap() else {
        panic!("expected an array buffer");
    };

    for offset in [0, 1, SIZE / 2, SIZE - 1] {
        for count in [0, 1, SIZE - 1, SIZE, SIZE * 2] {
            let mut dest = vec![0xff; SIZE * 2];
            let read = buffer.read_bytes(offset, count, &mut dest, 0).unwrap();
            assert_eq!(read, count.min(SIZE - offset), "offset {offset} count {count}");
            assert!(dest[read..].iter().all(|b| *b == 0xff));

            let written = buffer.write_bytes(&dest, 0, count, offset).unwrap();
            assert_eq!(written, read);
        }
    }
    for offset in [SIZE, SIZE + 1, usize::MAX] {
        let mut dest = [0u8; 1];
        let err = buffer.read_bytes(offset, 1, &mut dest, 0).unwrap_err();
        assert!(matches!(err, BridgeError::OutOfRange { size: SIZE, .. }));
        let err = buffer.write_bytes(&dest, 0, 1, offset).unwrap_err();
        assert!(matches!(err, BridgeError::OutOfRange { size: SIZE, .. }));
    }
}

#[test]
fn test_variant_is_stable_across_wraps() {
    let (engine, bridge) = setup();
    let handles = engine.exclusive(|engine| {
        let buffer = engine.new_array_buffer(vec![0; 32]);
        let view = engine.new_data_view(&buffer, 0, 8).unwrap();
        let bytes = engine.new_typed_array(BufferKind::Uint8Clamped, &buffer, 8, 8).unwrap();
        let floats = engine.new_typed_array(BufferKind::Float64, &buffer, 16, 2).unwrap();
        let func = engine.new_function("f", |_, _, _| Ok(ScriptValue::Undefined));
        vec![
            engine.new_object(),
            engine.new_array(&[]).unwrap(),
            engine.new_promise().unwrap(),
            func,
            buffer,
            view,
            bytes,
            floats,
        ]
    });
    let expected = [
        "object",
        "array",
        "promise",
        "object",
        "array buffer",
        "data view",
        "typed array",
        "typed array",
    ];

    for (handle, expected) in handles.into_iter().zip(expected) {
        let again = second_handle(&engine, &handle);
        let first = bridge.wrap(Some(handle)).unwrap().unwrap();
        let second = bridge.wrap(Some(again)).unwrap().unwrap();
        assert_eq!(first.variant_name(), expected);
        assert_eq!(second.variant_name(), expected);
        assert_eq!(first.kind(), second.kind());
    }
}

#[tokio::test]
async fn test_promise_from_successful_task() {
    let (_engine, bridge) = setup();
    let task = tokio::spawn(async { Ok::<_, BridgeError>(42) });
    let promise = bridge.promise_from_task(task).unwrap();
    assert!(promise.is_promise());

    let value = promise.into_task().unwrap().await;
    assert_eq!(value.unwrap(), HostValue::Int32(42));
}

#[tokio::test]
async fn test_promise_from_failed_task() {
    let (_engine, bridge) = setup();
    let task = tokio::spawn(async { Err::<i32, _>(BridgeError::script_error("TypeError", "E")) });
    let promise = bridge.promise_from_task(task).unwrap();

    let err = promise.into_task().unwrap().await.unwrap_err();
    assert_eq!(err.error_type(), "TypeError");
    assert_eq!(err.to_string(), "TypeError: E");
}

#[tokio::test]
async fn test_bridge_failure_rejects_as_error() {
    let (_engine, bridge) = setup();
    let task = tokio::spawn(async {
        Err::<i32, _>(BridgeError::KeyNotFound("config".into()))
    });
    let promise = bridge.promise_from_task(task).unwrap();

    let err = promise.into_task().unwrap().await.unwrap_err();
    assert_eq!(err.error_type(), "Error");
    assert_eq!(err.to_string(), "Error: Key not found: config");
}

#[tokio::test]
async fn test_cancelled_task_rejects() {
    let (_engine, bridge) = setup();
    let task = tokio::spawn(std::future::pending::<Result<(), BridgeError>>());
    task.abort();

    let promise = bridge.promise_from_task(task).unwrap();
    let err = promise.into_task().unwrap().await.unwrap_err();
    assert_eq!(err.error_type(), "AbortError");
}

#[test]
fn test_method_without_receiver() {
    let (engine, bridge) = setup();
    let handle = engine.exclusive(|engine| {
        let obj = engine.new_object();
        engine
            .set_property(&obj, "name", &ScriptValue::from("receiver"))
            .unwrap();
        let method = engine.new_function("method", |engine, this, args| {
            let Some(this) = this.as_handle() else {
                return Ok(ScriptValue::Undefined);
            };
            let name = engine.get_property(this, "name")?;
            let suffix = args.first().and_then(|a| a.as_str()).unwrap_or("");
            Ok(ScriptValue::String(format!("{}{}", name.as_str().unwrap_or("?"), suffix)))
        });
        engine
            .set_property(&obj, "method", &ScriptValue::Object(method))
            .unwrap();
        obj
    });
    let obj = bridge.wrap(Some(handle)).unwrap().unwrap();

    let method = obj.get_property("method").unwrap().into_proxy().unwrap();
    assert_eq!(method.holder(), Some(obj.clone()));

    let args = [HostValue::from("!")];
    let detached = method.call(&args).unwrap();
    let bound = obj.invoke_method("method", &args).unwrap();
    assert_eq!(detached, HostValue::from("receiver!"));
    assert_eq!(detached, bound);
}

#[test]
fn test_holder_binding_can_be_disabled() {
    let engine = Arc::new(MemoryEngine::new());
    let bridge = Bridge::builder().holder_binding(false).build(engine.clone());
    let handle = engine.exclusive(|engine| {
        let obj = engine.new_object();
        let method = engine.new_function("method", |_, this, _| Ok(ScriptValue::Boolean(this.is_object())));
        engine
            .set_property(&obj, "method", &ScriptValue::Object(method))
            .unwrap();
        obj
    });
    let obj = bridge.wrap(Some(handle)).unwrap().unwrap();

    let method = obj.get_property("method").unwrap().into_proxy().unwrap();
    assert!(method.holder().is_none());
    assert_eq!(method.call(&[]).unwrap(), HostValue::Bool(false));
    assert_eq!(obj.invoke_method("method", &[]).unwrap(), HostValue::Bool(true));
}

#[test]
fn test_array_bulk_operations() {
    let (engine, bridge) = setup();
    let items = [HostValue::from("a"), HostValue::from("b"), HostValue::from("c")];

    let array = array_of(&engine, &bridge, &items);
    assert_eq!(array.len().unwrap(), 3);
    array.clear().unwrap();
    assert_eq!(array.len().unwrap(), 0);

    let array = array_of(&engine, &bridge, &items);
    array.insert(0, "x").unwrap();
    assert_eq!(array.get(0).unwrap(), HostValue::from("x"));

    let array = array_of(&engine, &bridge, &items);
    array.remove_at(1).unwrap();
    let remaining = array.iter().unwrap().collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(remaining, vec![HostValue::from("a"), HostValue::from("c")]);
}

#[test]
fn test_dispatch_routes_errors_by_frame() {
    let (engine, bridge) = setup();
    let obj = bridge
        .wrap(Some(engine.exclusive(|engine| engine.new_object())))
        .unwrap()
        .unwrap();
    let mut frame = ScriptFrame::new();

    let bound = obj
        .dispatch(DispatchOp::SetMember("n", HostValue::Int32(5)), Some(&mut frame))
        .unwrap();
    assert_eq!(bound, Dispatch::Bound(HostValue::Int32(5)));

    let unbound = obj
        .dispatch(
            DispatchOp::Invoke {
                args: vec![],
                as_constructor: false,
            },
            Some(&mut frame),
        )
        .unwrap();
    assert_eq!(unbound, Dispatch::Unbound);
    assert_eq!(frame.take_error().map(|e| e.error_type().to_string()), Some("TypeError".into()));

    obj.dispose();
    let err = obj
        .dispatch(DispatchOp::GetMember("n"), Some(&mut frame))
        .unwrap_err();
    assert!(matches!(err, BridgeError::Disposed));
}

#[test]
fn test_concurrent_proxies_stay_serialized() {
    let (engine, bridge) = setup();
    let array = array_of(&engine, &bridge, &[]);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let array = array.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    array.push(worker * 100 + i).unwrap();
                    let copy = array.clone();
                    drop(copy);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(array.len().unwrap(), 100);
    drop(array);
    bridge.flush_releases().unwrap();

    assert_eq!(engine.stats().unsynchronized_calls, 0);
    assert_eq!(engine.stats().live_handles, 0);
    let stats = bridge.stats().snapshot();
    assert_eq!(stats.proxies_created, stats.proxies_disposed);
    assert_eq!(stats.pending_releases(), 0);
}
