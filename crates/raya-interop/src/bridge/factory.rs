//! Derived-type synthesis
//!
//! Builds, per (qualified name, base, override set), a managed type whose
//! constructors create a scripting companion and whose overridable slots
//! route through [`DispatchRoute`]. Base implementations stay reachable as
//! non-virtual shadow slots named `__base_{slot}`.

use super::declaration::{self, Declarations};
use super::descriptor::{DerivedTypeDescriptor, DerivedTypeInfo, DispatchBehavior, ExplicitMember};
use super::dispatch::{self, DispatchRoute, Fallback};
use super::lifetime;
use crate::context::BridgeInner;
use crate::managed::{
    getter_name, setter_name, CtorBody, ManagedRef, ManagedType, ManagedTypeBuilder, ManagedValue,
    MemberInfo, MemberKind, MethodBody, Signature, TypeDesc, TypeRef,
};
use crate::script::{ScriptClass, ScriptValue};
use crate::{InteropError, InteropResult};
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Name of the slot holding the base implementation of `slot`
pub fn shadow_name(slot: &str) -> String {
    format!("__base_{}", slot)
}

/// Parameters of one derived-type request
#[derive(Clone)]
pub struct DerivedTypeRequest {
    name: String,
    base: TypeRef,
    script_class: Arc<ScriptClass>,
    namespace: String,
    assembly: Option<String>,
    module: Option<String>,
}

impl DerivedTypeRequest {
    /// Subclass `base` as `name`, with companions of `script_class`
    pub fn new(name: impl Into<String>, base: &TypeRef, script_class: &Arc<ScriptClass>) -> Self {
        Self {
            name: name.into(),
            base: Arc::clone(base),
            script_class: Arc::clone(script_class),
            namespace: String::new(),
            assembly: None,
            module: None,
        }
    }

    /// Namespace of the generated type
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Generation container assembly (defaults to the configured name)
    pub fn assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = Some(assembly.into());
        self
    }

    /// Generation container module (defaults to the configured name)
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A generated slot and how it was derived
struct PlannedSlot {
    member: MemberInfo,
    script_name: String,
    fallback: Fallback,
}

struct Plan {
    descriptor: DerivedTypeDescriptor,
    slots: Vec<PlannedSlot>,
}

pub(crate) fn create_derived_type(
    bridge: &Arc<BridgeInner>,
    request: DerivedTypeRequest,
) -> InteropResult<TypeRef> {
    let base = &request.base;
    if base.is_sealed() {
        return Err(InteropError::InvalidBaseType {
            type_name: base.qualified_name(),
            reason: "type is sealed".to_string(),
        });
    }
    if base.derived().is_some() {
        return Err(InteropError::InvalidBaseType {
            type_name: base.qualified_name(),
            reason: "type is already bridge-generated; subclass its scripting class instead"
                .to_string(),
        });
    }

    let decls = declaration::parse(&request.script_class, &bridge.types)?;
    let qualified = request.qualified_name();
    let plan = plan(&qualified, base, &request.script_class, decls);

    let assembly = request
        .assembly
        .clone()
        .unwrap_or_else(|| bridge.options.default_assembly.clone());
    let module = request
        .module
        .clone()
        .unwrap_or_else(|| bridge.options.default_module.clone());
    let container = bridge.modules.get_or_create(&assembly, &module);

    let (ty, created) = container.define(
        &qualified,
        |existing| {
            existing.derived().is_some_and(|info| {
                Arc::ptr_eq(&info.script_class, &request.script_class)
                    && info.descriptor.same_identity(&plan.descriptor)
            })
        },
        || {
            if bridge.types.contains(&qualified) {
                return Err(InteropError::DuplicateType(qualified.clone()));
            }
            // Other containers may race for the same name
            let ty = build(bridge, &request, &assembly, &module, &plan);
            if !bridge.types.try_register(Arc::clone(&ty)) {
                return Err(InteropError::DuplicateType(qualified.clone()));
            }
            Ok(ty)
        },
    )?;

    if created {
        request.script_class.bind_managed_base(base);
        bridge.counters.types_generated.fetch_add(1, Ordering::Relaxed);
        debug!(
            type_name = %qualified,
            base = %base.qualified_name(),
            assembly = %assembly,
            module = %module,
            slots = plan.slots.len(),
            redirected = plan.descriptor.redirected.len(),
            "generated derived type"
        );
    }
    Ok(ty)
}

/// Decide every generated slot
///
/// Explicit properties claim their accessors first, then every overridable
/// member of the base chain and its interfaces, then explicit methods whose
/// managed name no virtual member already claimed.
fn plan(qualified: &str, base: &TypeRef, class: &ScriptClass, decls: Declarations) -> Plan {
    let mut claimed = FxHashSet::default();
    let mut slots = Vec::new();
    let mut overrides = BTreeMap::new();
    let mut redirected = BTreeSet::new();
    let mut explicit = Vec::new();

    for prop in decls.properties {
        let accessors = [
            (prop.getter, getter_name(&prop.name), MemberKind::Getter),
            (prop.setter, setter_name(&prop.name), MemberKind::Setter),
        ];
        for (wanted, slot, kind) in accessors {
            if !wanted {
                continue;
            }
            let signature = match kind {
                MemberKind::Setter => Signature::new(vec![prop.ty.clone()], TypeDesc::Void),
                _ => Signature::returning(prop.ty.clone()),
            };
            claimed.insert(slot.clone());
            overrides.insert(slot.clone(), DispatchBehavior::ForwardAlways);
            slots.push(PlannedSlot {
                member: MemberInfo::new(slot, kind, signature, None),
                script_name: prop.name.clone(),
                fallback: Fallback::Explicit,
            });
        }
        explicit.push(ExplicitMember::Property {
            name: prop.name,
            ty: prop.ty,
            getter: prop.getter,
            setter: prop.setter,
        });
    }

    for member in base.overridable_members() {
        if !claimed.insert(member.name.clone()) {
            continue;
        }
        let script_name = member.script_name().to_string();
        if matches!(
            class.lookup_scripted(&script_name),
            Some(value) if !matches!(value, ScriptValue::Managed(_))
        ) {
            redirected.insert(member.name.clone());
        }
        let (behavior, fallback) = match &member.body {
            Some(body) => (
                DispatchBehavior::ForwardIfOverridden {
                    shadow: shadow_name(&member.name),
                },
                Fallback::Shadow(Arc::clone(body)),
            ),
            None => (DispatchBehavior::ForwardAlways, Fallback::Abstract),
        };
        overrides.insert(member.name.clone(), behavior);
        slots.push(PlannedSlot {
            member,
            script_name,
            fallback,
        });
    }

    for method in decls.methods {
        if !claimed.insert(method.managed_name.clone()) {
            continue;
        }
        overrides.insert(
            method.managed_name.clone(),
            DispatchBehavior::ExplicitExposure(method.signature.clone()),
        );
        slots.push(PlannedSlot {
            member: MemberInfo::new(
                method.managed_name.clone(),
                MemberKind::Method,
                method.signature.clone(),
                None,
            ),
            script_name: method.script_name.clone(),
            fallback: Fallback::Explicit,
        });
        explicit.push(ExplicitMember::Method {
            script_name: method.script_name,
            managed_name: method.managed_name,
            signature: method.signature,
        });
    }

    Plan {
        descriptor: DerivedTypeDescriptor {
            qualified_name: qualified.to_string(),
            base: Arc::clone(base),
            marker: ManagedType::derived_marker(),
            redirected,
            explicit,
            overrides,
        },
        slots,
    }
}

fn build(
    bridge: &Arc<BridgeInner>,
    request: &DerivedTypeRequest,
    assembly: &str,
    module: &str,
    plan: &Plan,
) -> TypeRef {
    let base = &request.base;
    let weak_bridge = Arc::downgrade(bridge);
    let qualified = request.qualified_name();

    let mut builder = ManagedTypeBuilder::class(request.name.clone()).namespace(request.namespace.clone());
    let ctor_source = if base.is_interface() {
        builder = builder.implements(Arc::clone(base));
        ManagedType::object()
    } else {
        builder = builder.extends(Arc::clone(base));
        Arc::clone(base)
    };
    builder = builder.implements(ManagedType::derived_marker());

    for ctor in ctor_source.constructors() {
        let shadow = Arc::clone(&ctor.body);
        let bridge = weak_bridge.clone();
        let class = Arc::clone(&request.script_class);
        let body: CtorBody = Arc::new(move |this: &ManagedRef, args: &[ManagedValue]| {
            shadow(this, args)?;
            dispatch::construct_companion(&bridge, this, &class, args)
        });
        builder = builder.constructor_with(ctor.signature.params.clone(), body);
    }

    for slot in &plan.slots {
        if let Fallback::Shadow(body) = &slot.fallback {
            builder = builder.member(MemberInfo::new(
                shadow_name(&slot.member.name),
                slot.member.kind,
                slot.member.signature.clone(),
                Some(Arc::clone(body)),
            ));
        }

        let route = DispatchRoute {
            bridge: weak_bridge.clone(),
            type_name: qualified.clone(),
            slot: slot.member.name.clone(),
            script_name: slot.script_name.clone(),
            kind: slot.member.kind,
            signature: slot.member.signature.clone(),
            fallback: slot.fallback.clone(),
        };
        let thunk: MethodBody =
            Arc::new(move |this: &ManagedRef, args: &[ManagedValue]| route.invoke(this, args));
        builder = builder.member(
            MemberInfo::new(
                slot.member.name.clone(),
                slot.member.kind,
                slot.member.signature.clone(),
                Some(thunk),
            )
            .as_virtual(),
        );
    }

    builder
        .finalizer(lifetime::finalize_instance)
        .derived(DerivedTypeInfo {
            descriptor: Arc::new(plan.descriptor.clone()),
            script_class: Arc::clone(&request.script_class),
            assembly: assembly.to_string(),
            module: module.to_string(),
            bridge: weak_bridge,
        })
        .build()
}
