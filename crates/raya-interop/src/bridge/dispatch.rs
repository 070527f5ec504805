//! Dispatch thunks installed in generated vtables
//!
//! Every generated slot holds a [`DispatchRoute`]. A call first checks
//! whether the companion (instance attributes, then scripting class chain)
//! defines the member. If it does, and what it finds is not the bridged
//! view of this very managed member, the call is forwarded to scripting;
//! otherwise the shadow (base implementation) runs.

use super::lifetime;
use crate::context::BridgeInner;
use crate::managed::{
    getter_name, setter_name, ManagedRef, ManagedValue, MemberKind, MethodBody, Signature,
};
use crate::marshal;
use crate::script::{Gil, ManagedMember, ScriptClass, ScriptError, ScriptRef, ScriptValue};
use crate::{InteropError, InteropResult};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

/// What a slot does when scripting does not handle the call
#[derive(Clone)]
pub(crate) enum Fallback {
    /// Run the base implementation
    Shadow(MethodBody),
    /// Abstract member: nothing to fall back to
    Abstract,
    /// Scripting-added member: never falls back
    Explicit,
}

/// Routing data captured by one generated vtable slot
#[derive(Clone)]
pub(crate) struct DispatchRoute {
    pub(crate) bridge: Weak<BridgeInner>,
    pub(crate) type_name: String,
    pub(crate) slot: String,
    pub(crate) script_name: String,
    pub(crate) kind: MemberKind,
    pub(crate) signature: Signature,
    pub(crate) fallback: Fallback,
}

enum Target {
    Forward(ScriptValue),
    FallBack,
}

impl DispatchRoute {
    /// Run the slot for `this`
    pub(crate) fn invoke(&self, this: &ManagedRef, args: &[ManagedValue]) -> InteropResult<ManagedValue> {
        let Some((companion, token)) = this.companion().and_then(|h| h.companion()) else {
            return self.fall_back(this, args);
        };
        let bridge = self
            .bridge
            .upgrade()
            .ok_or(InteropError::RuntimeUnavailable)?;
        let session = bridge.runtime.require(token)?;
        let gil = session.lock();
        if session.is_ended() {
            return Err(InteropError::RuntimeUnavailable);
        }
        if !gil.is_alive(companion) {
            drop(gil);
            return self.fall_back(this, args);
        }

        let target = match self.resolve(&gil, companion)? {
            Target::Forward(target) => target,
            Target::FallBack => {
                drain_at_safe_point(&bridge, &gil);
                drop(gil);
                bridge.counters.fallback_calls.fetch_add(1, Ordering::Relaxed);
                return self.fall_back(this, args);
            }
        };

        bridge.counters.forwarded_calls.fetch_add(1, Ordering::Relaxed);
        let result = self.forward(&gil, companion, &target, args);
        gil.release(target);
        lifetime::promote_if_escaped(&gil, this, companion);

        drain_at_safe_point(&bridge, &gil);
        result
    }

    fn resolve(&self, gil: &Gil<'_>, companion: ScriptRef) -> InteropResult<Target> {
        let found = gil.get_attr(companion, &self.script_name);
        match (found, &self.fallback) {
            (None, Fallback::Explicit) => Err(self.not_implemented()),
            (None, _) => Ok(Target::FallBack),
            (Some(ScriptValue::Managed(member)), Fallback::Shadow(_) | Fallback::Abstract)
                if member.name == self.script_name =>
            {
                Ok(Target::FallBack)
            }
            (Some(value), _) => Ok(Target::Forward(value)),
        }
    }

    fn forward(
        &self,
        gil: &Gil<'_>,
        companion: ScriptRef,
        target: &ScriptValue,
        args: &[ManagedValue],
    ) -> InteropResult<ManagedValue> {
        let this = ScriptValue::Object(companion);
        match self.kind {
            MemberKind::Method => {
                let script_args = marshal::args_to_script(gil, args)?;
                let outcome = gil.call(target, &this, &script_args);
                marshal::release_all(gil, script_args);
                self.convert_result(gil, outcome?)
            }
            MemberKind::Getter => {
                let value = match target {
                    ScriptValue::Property(prop) => match &prop.fget {
                        Some(fget) => fget(gil, &this, &[])?,
                        None => {
                            return Err(ScriptError::attribute_error(format!(
                                "property '{}' is not readable",
                                self.script_name
                            ))
                            .into())
                        }
                    },
                    plain => {
                        gil.retain(plain);
                        plain.clone()
                    }
                };
                self.convert_result(gil, value)
            }
            MemberKind::Setter => {
                let value = marshal::to_script(gil, args.first().unwrap_or(&ManagedValue::Null))?;
                let outcome = match target {
                    ScriptValue::Property(prop) => match &prop.fset {
                        Some(fset) => fset(gil, &this, std::slice::from_ref(&value))
                            .map(|out| gil.release(out)),
                        None => Err(ScriptError::attribute_error(format!(
                            "can't set attribute '{}'",
                            self.script_name
                        ))),
                    },
                    _ => gil.set_attr(companion, &self.script_name, &value),
                };
                gil.release(value);
                outcome?;
                Ok(ManagedValue::Null)
            }
        }
    }

    fn convert_result(&self, gil: &Gil<'_>, value: ScriptValue) -> InteropResult<ManagedValue> {
        let converted = marshal::from_script(gil, &value, &self.signature.ret);
        gil.release(value);
        converted
    }

    fn fall_back(&self, this: &ManagedRef, args: &[ManagedValue]) -> InteropResult<ManagedValue> {
        match &self.fallback {
            Fallback::Shadow(body) => body(this, args),
            Fallback::Abstract | Fallback::Explicit => Err(self.not_implemented()),
        }
    }

    fn not_implemented(&self) -> InteropError {
        InteropError::NotImplemented {
            type_name: self.type_name.clone(),
            member: self.slot.clone(),
        }
    }
}

/// Build the companion of a freshly constructed instance
///
/// The companion is recorded as weak before the scripting `__init__` runs,
/// then the construction reference is released. If `__init__` stored the
/// companion somewhere, the remaining references keep it strong.
pub(crate) fn construct_companion(
    bridge: &Weak<BridgeInner>,
    instance: &ManagedRef,
    class: &Arc<ScriptClass>,
    args: &[ManagedValue],
) -> InteropResult<()> {
    let handle = instance
        .companion()
        .ok_or_else(|| InteropError::NotDerived(instance.type_ref().qualified_name()))?;
    let bridge = bridge.upgrade().ok_or(InteropError::RuntimeUnavailable)?;
    let session = bridge
        .runtime
        .current()
        .ok_or(InteropError::RuntimeUnavailable)?;
    let gil = session.lock();
    if session.is_ended() {
        return Err(InteropError::RuntimeUnavailable);
    }

    let companion = gil.new_companion(class, instance);
    handle.attach_weak(companion, gil.token());
    bridge
        .counters
        .companions_created
        .fetch_add(1, Ordering::Relaxed);

    if let Some(init @ ScriptValue::Function(_)) = class.lookup_scripted("__init__") {
        let outcome = marshal::args_to_script(&gil, args).and_then(|script_args| {
            let out = gil.call(&init, &ScriptValue::Object(companion), &script_args);
            marshal::release_all(&gil, script_args);
            out.map_err(InteropError::from)
        });
        match outcome {
            Ok(out) => gil.release(out),
            Err(e) => {
                handle.clear();
                gil.free(companion);
                return Err(e);
            }
        }
    }

    if gil.refcount(companion).unwrap_or(0) > 1 {
        handle.promote(Arc::clone(instance));
    }
    gil.decref(companion);
    drain_at_safe_point(&bridge, &gil);
    Ok(())
}

/// Release queued finalizations when the lock is held by the outermost frame
fn drain_at_safe_point(bridge: &BridgeInner, gil: &Gil<'_>) {
    if gil.depth() == 1 && bridge.options.drain_on_dispatch {
        bridge
            .finalizers
            .drain_locked(gil, bridge.options.max_drain_batch);
    }
}

/// Call a bridged managed member from scripting
///
/// On a generated instance this runs the shadow slot, so an override can
/// chain to its base implementation without re-entering dispatch.
pub(crate) fn call_managed_member(
    gil: &Gil<'_>,
    member: &ManagedMember,
    this: &ScriptValue,
    args: &[ScriptValue],
) -> Result<ScriptValue, ScriptError> {
    let instance = match this {
        ScriptValue::Object(r) => gil.managed_of(*r),
        ScriptValue::Opaque(obj) => Some(Arc::clone(obj)),
        _ => None,
    }
    .ok_or_else(|| {
        ScriptError::type_error(format!(
            "'{}' requires a managed instance",
            member.name
        ))
    })?;

    let slot = match (member.property, args.len()) {
        (false, _) => member.name.clone(),
        (true, 0) => getter_name(&member.name),
        (true, _) => setter_name(&member.name),
    };
    let ty = instance.type_ref();
    let generated = ty
        .derived()
        .is_some_and(|info| info.descriptor().overrides.contains_key(&slot));
    let target = if generated {
        super::factory::shadow_name(&slot)
    } else {
        slot.clone()
    };
    let info = ty.resolve(&target).ok_or_else(|| {
        let error = if generated {
            InteropError::NotImplemented {
                type_name: ty.qualified_name(),
                member: slot.clone(),
            }
        } else {
            InteropError::MissingMember {
                type_name: ty.qualified_name(),
                member: slot.clone(),
            }
        };
        ScriptError::from(error)
    })?;

    if info.signature.arity() != args.len() {
        return Err(InteropError::ArityMismatch {
            member: slot,
            expected: info.signature.arity(),
            found: args.len(),
        }
        .into());
    }
    let mut managed_args = Vec::with_capacity(args.len());
    for (arg, desc) in args.iter().zip(&info.signature.params) {
        managed_args.push(marshal::from_script(gil, arg, desc)?);
    }

    let result = instance.call(&target, &managed_args)?;
    Ok(marshal::to_script(gil, &result)?)
}
