//! Identity and override table of a generated type

use crate::context::BridgeInner;
use crate::managed::{Signature, TypeDesc, TypeRef};
use crate::script::ScriptClass;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// How a generated vtable slot chooses between scripting and the base
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchBehavior {
    /// Forward when scripting overrides the member, else call `shadow`
    ForwardIfOverridden {
        /// Slot holding the base implementation
        shadow: String,
    },
    /// Always forward (abstract member or explicit scripting property)
    ForwardAlways,
    /// Scripting-added member with a declared signature
    ExplicitExposure(Signature),
}

/// A member added by scripting through exposure metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplicitMember {
    /// Exposed method
    Method {
        /// Attribute name on the scripting class
        script_name: String,
        /// Slot name on the managed side
        managed_name: String,
        /// Declared signature
        signature: Signature,
    },
    /// Exposed property
    Property {
        /// Property name
        name: String,
        /// Declared type
        ty: TypeDesc,
        /// A `get_` accessor is generated
        getter: bool,
        /// A `set_` accessor is generated
        setter: bool,
    },
}

/// Immutable description of one generated type
#[derive(Debug, Clone)]
pub struct DerivedTypeDescriptor {
    /// Namespace-qualified name
    pub qualified_name: String,
    /// Requested base (class or interface)
    pub base: TypeRef,
    /// Marker interface tagging generated types
    pub marker: TypeRef,
    /// Slots the scripting class overrode when the type was generated
    pub redirected: BTreeSet<String>,
    /// Scripting-added members
    pub explicit: Vec<ExplicitMember>,
    /// Every generated slot and its dispatch behavior
    pub overrides: BTreeMap<String, DispatchBehavior>,
}

impl DerivedTypeDescriptor {
    /// Same name, same base and the same requested overrides
    pub fn same_identity(&self, other: &DerivedTypeDescriptor) -> bool {
        self.qualified_name == other.qualified_name
            && Arc::ptr_eq(&self.base, &other.base)
            && self.redirected == other.redirected
            && self.explicit == other.explicit
            && self.overrides == other.overrides
    }

    /// Dispatch behavior of a slot
    pub fn behavior(&self, slot: &str) -> Option<&DispatchBehavior> {
        self.overrides.get(slot)
    }
}

/// Generation data attached to a bridge-generated [`ManagedType`](crate::ManagedType)
#[derive(Clone)]
pub struct DerivedTypeInfo {
    pub(crate) descriptor: Arc<DerivedTypeDescriptor>,
    pub(crate) script_class: Arc<ScriptClass>,
    pub(crate) assembly: String,
    pub(crate) module: String,
    pub(crate) bridge: Weak<BridgeInner>,
}

impl DerivedTypeInfo {
    /// Descriptor
    pub fn descriptor(&self) -> &Arc<DerivedTypeDescriptor> {
        &self.descriptor
    }

    /// Scripting class whose instances are the companions
    pub fn script_class(&self) -> &Arc<ScriptClass> {
        &self.script_class
    }

    /// Generation container as `(assembly, module)`
    pub fn container(&self) -> (&str, &str) {
        (&self.assembly, &self.module)
    }

    pub(crate) fn bridge(&self) -> Option<Arc<BridgeInner>> {
        self.bridge.upgrade()
    }
}

impl fmt::Debug for DerivedTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedTypeInfo")
            .field("type", &self.descriptor.qualified_name)
            .field("script_class", &self.script_class.name())
            .field("assembly", &self.assembly)
            .field("module", &self.module)
            .finish()
    }
}
