//! Lifetime bridge between the managed collector and scripting refcounts
//!
//! A companion is owned by exactly one side at a time:
//! - Weak: scripting holds no counted reference; the companion is detached
//!   and is released through the finalization queue once the managed
//!   instance is finalized
//! - Strong: scripting holds references and the handle pins the managed
//!   instance; when the refcount reaches zero the pin is dropped and the
//!   handle returns to Weak

use super::handle::{CompanionHandle, ReferenceState};
use crate::managed::{ManagedObject, ManagedRef};
use crate::script::{Gil, ScriptRef, ScriptValue};
use crate::{InteropError, InteropResult};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::trace;

/// Hand a generated instance to scripting as an owned companion reference
pub fn expose(gil: &Gil<'_>, instance: &ManagedRef) -> InteropResult<ScriptValue> {
    let handle = instance
        .companion()
        .ok_or_else(|| InteropError::NotDerived(instance.type_ref().qualified_name()))?;
    let (companion, token) = handle.companion().ok_or(InteropError::RuntimeUnavailable)?;
    if token != gil.token() || !gil.is_alive(companion) {
        return Err(InteropError::RuntimeUnavailable);
    }
    promote_if_first_exposure(gil, instance, companion);
    Ok(ScriptValue::Object(companion))
}

/// Take a scripting reference to `companion`, pinning the instance when
/// this is the first reference since the handle was last weak
///
/// Returns true if the handle was promoted.
pub fn promote_if_first_exposure(gil: &Gil<'_>, instance: &ManagedRef, companion: ScriptRef) -> bool {
    let Some(handle) = instance.companion() else {
        gil.incref(companion);
        return false;
    };
    let at_baseline = gil.refcount(companion) == Some(0);
    gil.incref(companion);
    if !at_baseline {
        return false;
    }

    pin(gil, instance, handle, companion)
}

/// Pin the instance if scripting kept an uncounted receiver
///
/// Dispatch passes the companion to scripting without taking a reference.
/// An override that stored it leaves the refcount above the detached
/// baseline while the handle is still weak; the handle becomes strong so
/// the instance lives as long as scripting can reach it.
pub fn promote_if_escaped(gil: &Gil<'_>, instance: &ManagedRef, companion: ScriptRef) -> bool {
    let Some(handle) = instance.companion() else {
        return false;
    };
    if gil.refcount(companion).unwrap_or(0) == 0 || handle.state() != Some(ReferenceState::Weak) {
        return false;
    }
    pin(gil, instance, handle, companion)
}

fn pin(gil: &Gil<'_>, instance: &ManagedRef, handle: &CompanionHandle, companion: ScriptRef) -> bool {
    gil.reattach(companion);
    let promoted = handle.promote(Arc::clone(instance));
    if promoted {
        trace!(companion = companion.id(), "companion promoted to strong");
        if let Some(bridge) = instance.type_ref().derived().and_then(|d| d.bridge()) {
            bridge.counters.promotions.fetch_add(1, Ordering::Relaxed);
        }
    }
    promoted
}

/// Refcount of a linked companion reached zero
///
/// The companion is not freed: it is detached from scripting collection,
/// its handle goes back to weak and final disposal is left to the managed
/// finalizer. The pin is dropped last, after every lock guard is released.
pub fn on_scripting_dealloc_requested(gil: &Gil<'_>, companion: ScriptRef) {
    let instance = gil.managed_of(companion);
    gil.detach(companion);
    let pin = instance
        .as_ref()
        .and_then(|obj| obj.companion())
        .and_then(|handle| handle.demote());
    trace!(
        companion = companion.id(),
        unpinned = pin.is_some(),
        "companion handed back to the managed side"
    );
    drop(pin);
    drop(instance);
}

/// Finalizer entry point installed on every generated type
///
/// Runs on whatever thread drops the last managed reference. Takes the
/// companion out of the handle, so a repeated call is a no-op, and queues
/// it for release under the interpreter lock.
pub fn finalize_instance(instance: &ManagedObject) {
    let Some(pending) = instance.companion().and_then(|h| h.take_for_finalization()) else {
        return;
    };
    match instance.type_ref().derived().and_then(|d| d.bridge()) {
        Some(bridge) => bridge.finalizers.enqueue(pending),
        None => trace!(
            companion = pending.companion.id(),
            "bridge dropped; finalization skipped"
        ),
    }
}

/// Demote every strong companion of the session before its heap is freed
///
/// Returns the pins and linked instances; the caller drops them once the
/// interpreter lock is released.
pub(crate) fn sever_for_shutdown(gil: &Gil<'_>) -> Vec<ManagedRef> {
    let mut released = Vec::new();
    for (_, link) in gil.linked_objects() {
        let Some(instance) = link.upgrade() else {
            continue;
        };
        if let Some(pin) = instance.companion().and_then(|h| h.demote()) {
            released.push(pin);
        }
        released.push(instance);
    }
    released
}
