//! Integration tests for companion lifetime management
//!
//! Tests validate:
//! - Scripting references keep the managed instance alive (strong mode)
//! - Unreferenced companions follow the managed instance (weak mode)
//! - Each finalized instance yields exactly one queued release
//! - Re-exposure after demotion promotes again
//! - An override that keeps `self` pins its instance
//! - Construction and fallback calls release queued finalizations
//! - Session shutdown fails handles cleanly instead of crashing
//!
//! # Running Tests
//! ```bash
//! cargo test --test lifetime_integration
//! ```

use raya_interop::{
    bridge::lifetime, Bridge, BridgeOptions, DerivedTypeRequest, InteropError, ManagedRef,
    ManagedTypeBuilder, ManagedValue, ReferenceState, ScriptClass, ScriptError, ScriptRef,
    ScriptValue, Signature, TypeDesc, TypeRef,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Fixture {
    bridge: Bridge,
    ty: TypeRef,
    finalized: Arc<AtomicUsize>,
}

fn fixture_with(options: BridgeOptions, class: ScriptClass) -> Fixture {
    let bridge = Bridge::with_options(options);
    bridge.initialize();

    let finalized = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finalized);
    let base = ManagedTypeBuilder::class("Resource")
        .namespace("Demo")
        .fields(1)
        .constructor(vec![], |_, _| Ok(()))
        .constructor(vec![TypeDesc::String], |this, args| {
            this.set_field(0, args[0].clone()).unwrap();
            Ok(())
        })
        .virtual_method("Greet", Signature::returning(TypeDesc::String), |_, _| {
            Ok(ManagedValue::from("base"))
        })
        .finalizer(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let class = Arc::new(class);
    let ty = bridge
        .create_derived_type(DerivedTypeRequest::new(class.name(), &base, &class).namespace("Demo"))
        .unwrap();
    Fixture {
        bridge,
        ty,
        finalized,
    }
}

fn fixture() -> Fixture {
    fixture_with(
        BridgeOptions::default(),
        ScriptClass::new("PyResource").with_attr(
            "Greet",
            ScriptValue::function("Greet", |_, _, _| Ok(ScriptValue::from("scripted"))),
        ),
    )
}

fn companion_of(obj: &ManagedRef) -> ScriptRef {
    obj.companion().unwrap().companion().unwrap().0
}

fn state_of(obj: &ManagedRef) -> Option<ReferenceState> {
    obj.companion().unwrap().state()
}

// ===== Weak Mode =====

#[test]
fn test_new_instance_starts_weak() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    let companion = companion_of(&obj);

    assert_eq!(state_of(&obj), Some(ReferenceState::Weak));
    fx.bridge
        .with_gil(|gil| {
            assert_eq!(gil.refcount(companion), Some(0));
            assert!(gil.is_detached(companion));
            assert!(gil.managed_of(companion).is_some());
        })
        .unwrap();
    assert_eq!(fx.bridge.counters().companions_created(), 1);
}

#[test]
fn test_weak_companion_collected_with_instance() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    let companion = companion_of(&obj);

    drop(obj);
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(fx.bridge.finalizers().len(), 1);
    // Not yet released: that happens under the interpreter lock
    assert!(fx.bridge.with_gil(|gil| gil.is_alive(companion)).unwrap());

    let stats = fx.bridge.drain_finalizers();
    assert_eq!(stats.released, 1);
    assert_eq!(stats.total(), 1);
    assert!(!fx.bridge.with_gil(|gil| gil.is_alive(companion)).unwrap());
    assert!(fx.bridge.finalizers().is_empty());
}

#[test]
fn test_repeated_finalization_is_a_no_op() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();

    lifetime::finalize_instance(&obj);
    lifetime::finalize_instance(&obj);
    assert_eq!(fx.bridge.finalizers().len(), 1);
    assert_eq!(state_of(&obj), None);

    // The real finalizer finds nothing left to release
    drop(obj);
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(fx.bridge.finalizers().total_enqueued(), 1);
    assert_eq!(fx.bridge.drain_finalizers().released, 1);
}

#[test]
fn test_finalized_handle_falls_back_to_base() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    assert_eq!(obj.call("Greet", &[]).unwrap(), ManagedValue::from("scripted"));

    lifetime::finalize_instance(&obj);
    assert_eq!(obj.call("Greet", &[]).unwrap(), ManagedValue::from("base"));
}

// ===== Strong Mode =====

#[test]
fn test_scripting_reference_keeps_instance_alive() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    let weak = Arc::downgrade(&obj);

    let companion = fx
        .bridge
        .with_gil(|gil| {
            let value = fx.bridge.expose(gil, &obj).unwrap();
            gil.set_global("keep", &value);
            let companion = value.as_object().unwrap();
            gil.release(value);
            companion
        })
        .unwrap();
    assert_eq!(state_of(&obj), Some(ReferenceState::Strong));
    assert_eq!(fx.bridge.counters().promotions(), 1);

    drop(obj);
    assert!(weak.upgrade().is_some());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 0);
    assert!(fx.bridge.finalizers().is_empty());

    // Scripting still reaches the instance through its companion
    let greeting = fx
        .bridge
        .with_gil(|gil| gil.call_method(companion, "Greet", &[]).unwrap())
        .unwrap();
    assert_eq!(greeting, ScriptValue::from("scripted"));

    fx.bridge
        .with_gil(|gil| {
            assert!(gil.del_global("keep"));
        })
        .unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(fx.bridge.finalizers().len(), 1);

    assert_eq!(fx.bridge.drain_finalizers().released, 1);
    assert!(!fx.bridge.with_gil(|gil| gil.is_alive(companion)).unwrap());
}

#[test]
fn test_demotion_and_repromotion() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();

    for round in 1..=3u64 {
        fx.bridge
            .with_gil(|gil| {
                let value = fx.bridge.expose(gil, &obj).unwrap();
                assert_eq!(state_of(&obj), Some(ReferenceState::Strong));
                let companion = value.as_object().unwrap();
                assert!(!gil.is_detached(companion));

                gil.release(value);
                assert_eq!(state_of(&obj), Some(ReferenceState::Weak));
                assert!(gil.is_detached(companion));
                assert!(gil.is_alive(companion));
            })
            .unwrap();
        assert_eq!(fx.bridge.counters().promotions(), round);
    }
}

#[test]
fn test_nested_exposure_promotes_once() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();

    fx.bridge
        .with_gil(|gil| {
            let first = fx.bridge.expose(gil, &obj).unwrap();
            let second = fx.bridge.expose(gil, &obj).unwrap();
            assert_eq!(first, second);
            assert_eq!(gil.refcount(first.as_object().unwrap()), Some(2));

            gil.release(second);
            assert_eq!(state_of(&obj), Some(ReferenceState::Strong));
            gil.release(first);
            assert_eq!(state_of(&obj), Some(ReferenceState::Weak));
        })
        .unwrap();
    assert_eq!(fx.bridge.counters().promotions(), 1);
}

#[test]
fn test_override_storing_self_keeps_instance_alive() {
    let class = ScriptClass::new("PyKeeper").with_attr(
        "Greet",
        ScriptValue::function("Greet", |gil, this, _| {
            gil.set_global("kept", this);
            Ok(ScriptValue::from("kept"))
        }),
    );
    let fx = fixture_with(BridgeOptions::default(), class);
    let obj = fx.ty.instantiate(&[ManagedValue::from("label")]).unwrap();
    let companion = companion_of(&obj);
    let weak = Arc::downgrade(&obj);

    assert_eq!(obj.call("Greet", &[]).unwrap(), ManagedValue::from("kept"));
    assert_eq!(state_of(&obj), Some(ReferenceState::Strong));
    assert_eq!(fx.bridge.counters().promotions(), 1);

    drop(obj);
    fx.bridge.drain_finalizers();
    assert!(weak.upgrade().is_some());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 0);

    fx.bridge
        .with_gil(|gil| {
            assert!(!gil.is_detached(companion));
            assert!(!gil.is_orphaned(companion));
            assert!(gil.managed_of(companion).is_some());
            gil.del_global("kept");
        })
        .unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
    assert_eq!(fx.bridge.drain_finalizers().released, 1);
}

#[test]
fn test_forwarded_call_without_escape_stays_weak() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();

    for _ in 0..3 {
        assert_eq!(obj.call("Greet", &[]).unwrap(), ManagedValue::from("scripted"));
    }
    assert_eq!(state_of(&obj), Some(ReferenceState::Weak));
    assert_eq!(fx.bridge.counters().promotions(), 0);
    assert_eq!(
        fx.bridge.with_gil(|gil| gil.refcount(companion_of(&obj))).unwrap(),
        Some(0)
    );
}

#[test]
fn test_init_storing_self_starts_strong() {
    let class = ScriptClass::new("PyRegistered").with_attr(
        "__init__",
        ScriptValue::function("__init__", |gil, this, args| {
            let r = this.as_object().unwrap();
            gil.set_attr(r, "label", &args[0])?;
            gil.set_global("registered", this);
            Ok(ScriptValue::None)
        }),
    );
    let fx = fixture_with(BridgeOptions::default(), class);

    let obj = fx.ty.instantiate(&[ManagedValue::from("first")]).unwrap();
    assert_eq!(state_of(&obj), Some(ReferenceState::Strong));

    let weak = Arc::downgrade(&obj);
    drop(obj);
    assert!(weak.upgrade().is_some());

    fx.bridge
        .with_gil(|gil| {
            let stored = gil.get_global("registered").unwrap();
            let r = stored.as_object().unwrap();
            assert_eq!(gil.get_attr(r, "label"), Some(ScriptValue::from("first")));
            gil.release(stored);
            gil.del_global("registered");
        })
        .unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
}

#[test]
fn test_init_failure_leaves_no_companion() {
    let class = ScriptClass::new("PyFailing").with_attr(
        "__init__",
        ScriptValue::function("__init__", |_, _, _| {
            Err(ScriptError::new("ValueError", "bad init"))
        }),
    );
    let fx = fixture_with(BridgeOptions::default(), class);

    match fx.ty.instantiate(&[]) {
        Err(InteropError::Script(err)) => assert_eq!(err.kind, "ValueError"),
        other => panic!("expected script error, got {:?}", other.map(|_| ())),
    }
    assert_eq!(fx.bridge.with_gil(|gil| gil.object_count()).unwrap(), 0);
    assert!(fx.bridge.finalizers().is_empty());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);
}

// ===== Orphans =====

#[test]
fn test_companion_outliving_instance_is_orphaned() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();

    let companion = fx
        .bridge
        .with_gil(|gil| {
            let value = fx.bridge.expose(gil, &obj).unwrap();
            gil.set_global("keep", &value);
            value.as_object().unwrap()
        })
        .unwrap();

    // Force finalization while scripting still holds references
    lifetime::finalize_instance(&obj);
    let stats = fx.bridge.drain_finalizers();
    assert_eq!(stats.orphaned, 1);

    fx.bridge
        .with_gil(|gil| {
            assert!(gil.is_orphaned(companion));
            assert!(gil.managed_of(companion).is_none());
            // Released like any plain object from now on
            gil.decref(companion);
            gil.del_global("keep");
            assert!(!gil.is_alive(companion));
        })
        .unwrap();
}

// ===== Drain Policy =====

#[test]
fn test_forwarded_call_drains_queue() {
    let fx = fixture();
    let doomed = fx.ty.instantiate(&[]).unwrap();
    let survivor = fx.ty.instantiate(&[]).unwrap();

    drop(doomed);
    assert_eq!(fx.bridge.finalizers().len(), 1);

    survivor.call("Greet", &[]).unwrap();
    assert!(fx.bridge.finalizers().is_empty());
}

#[test]
fn test_fallback_call_drains_queue() {
    let fx = fixture_with(BridgeOptions::default(), ScriptClass::new("PyPlain"));
    let doomed = fx.ty.instantiate(&[]).unwrap();
    let survivor = fx.ty.instantiate(&[]).unwrap();

    drop(doomed);
    assert_eq!(fx.bridge.finalizers().len(), 1);

    assert_eq!(survivor.call("Greet", &[]).unwrap(), ManagedValue::from("base"));
    assert!(fx.bridge.finalizers().is_empty());
    assert_eq!(fx.bridge.counters().fallback_calls(), 1);
}

#[test]
fn test_heap_bounded_without_overrides() {
    let fx = fixture_with(BridgeOptions::default(), ScriptClass::new("PyPlain"));
    let cycles = 500;

    for _ in 0..cycles {
        let obj = fx.ty.instantiate(&[]).unwrap();
        assert_eq!(obj.call("Greet", &[]).unwrap(), ManagedValue::from("base"));
        drop(obj);
    }

    // Each construction released the instance dropped before it
    assert_eq!(fx.bridge.finalizers().len(), 1);
    assert_eq!(fx.bridge.finalizers().total_consumed(), cycles - 1);
    assert_eq!(fx.bridge.with_gil(|gil| gil.object_count()).unwrap(), 1);
    assert_eq!(fx.finalized.load(Ordering::SeqCst), cycles as usize);
}

#[test]
fn test_drain_on_dispatch_disabled() {
    let fx = fixture_with(
        BridgeOptions::default().with_drain_on_dispatch(false),
        ScriptClass::new("PyResource").with_attr(
            "Greet",
            ScriptValue::function("Greet", |_, _, _| Ok(ScriptValue::from("scripted"))),
        ),
    );
    let doomed = fx.ty.instantiate(&[]).unwrap();
    let survivor = fx.ty.instantiate(&[]).unwrap();

    drop(doomed);
    survivor.call("Greet", &[]).unwrap();
    assert_eq!(fx.bridge.finalizers().len(), 1);
}

#[test]
fn test_drain_batch_limit() {
    let fx = fixture_with(
        BridgeOptions::default()
            .with_drain_on_dispatch(false)
            .with_max_drain_batch(2),
        ScriptClass::new("PyResource"),
    );
    let instances: Vec<_> = (0..5).map(|_| fx.ty.instantiate(&[]).unwrap()).collect();
    drop(instances);
    assert_eq!(fx.bridge.finalizers().len(), 5);

    assert_eq!(fx.bridge.drain_finalizers().released, 2);
    assert_eq!(fx.bridge.drain_finalizers().released, 2);
    assert_eq!(fx.bridge.drain_finalizers().released, 1);
    assert_eq!(fx.bridge.drain_finalizers().total(), 0);
}

// ===== Shutdown =====

#[test]
fn test_dispatch_after_shutdown() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    assert!(fx.bridge.shutdown());

    assert!(matches!(
        obj.call("Greet", &[]),
        Err(InteropError::RuntimeUnavailable)
    ));
    assert!(matches!(
        fx.ty.instantiate(&[]),
        Err(InteropError::RuntimeUnavailable)
    ));
}

#[test]
fn test_stale_handle_after_restart() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    fx.bridge.shutdown();
    fx.bridge.initialize();

    // The handle belongs to the ended session
    assert!(matches!(
        obj.call("Greet", &[]),
        Err(InteropError::RuntimeUnavailable)
    ));
    assert!(matches!(
        fx.bridge.with_gil(|gil| fx.bridge.expose(gil, &obj)).unwrap(),
        Err(InteropError::RuntimeUnavailable)
    ));

    // New instances get companions in the new session
    let fresh = fx.ty.instantiate(&[]).unwrap();
    assert_eq!(fresh.call("Greet", &[]).unwrap(), ManagedValue::from("scripted"));

    drop(obj);
    let stats = fx.bridge.drain_finalizers();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.released, 0);
}

#[test]
fn test_shutdown_unpins_strong_companions() {
    let fx = fixture();
    let obj = fx.ty.instantiate(&[]).unwrap();
    let weak = Arc::downgrade(&obj);

    fx.bridge
        .with_gil(|gil| {
            let value = fx.bridge.expose(gil, &obj).unwrap();
            gil.set_global("keep", &value);
            gil.release(value);
        })
        .unwrap();
    drop(obj);
    assert!(weak.upgrade().is_some());

    fx.bridge.shutdown();
    assert!(weak.upgrade().is_none());
    assert_eq!(fx.finalized.load(Ordering::SeqCst), 1);

    // Nothing live to release into: the entry is discarded
    let stats = fx.bridge.drain_finalizers();
    assert_eq!(stats.discarded, 1);
}
