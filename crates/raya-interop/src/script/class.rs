//! Scripting classes

use super::value::{ManagedMember, ScriptValue};
use crate::managed::{getter_name, setter_name, MemberKind, TypeRef};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A scripting class with a mutable attribute dictionary
///
/// Class attributes do not own heap references; store functions,
/// properties and primitives here and keep objects on instances.
pub struct ScriptClass {
    name: String,
    bases: Vec<Arc<ScriptClass>>,
    managed_base: OnceCell<TypeRef>,
    attrs: RwLock<FxHashMap<String, ScriptValue>>,
}

impl ScriptClass {
    /// Create a class without bases
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            managed_base: OnceCell::new(),
            attrs: RwLock::new(FxHashMap::default()),
        }
    }

    /// Add scripting base classes (searched in order after own attributes)
    pub fn with_bases(mut self, bases: Vec<Arc<ScriptClass>>) -> Self {
        self.bases = bases;
        self
    }

    /// Bind the managed type whose members this class inherits
    pub fn with_managed_base(self, base: TypeRef) -> Self {
        let _ = self.managed_base.set(base);
        self
    }

    /// Add an attribute while building
    pub fn with_attr(self, name: impl Into<String>, value: ScriptValue) -> Self {
        self.attrs.write().insert(name.into(), value);
        self
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scripting bases
    pub fn bases(&self) -> &[Arc<ScriptClass>] {
        &self.bases
    }

    /// Managed base, if bound
    pub fn managed_base(&self) -> Option<&TypeRef> {
        self.managed_base.get().or_else(|| {
            self.bases.iter().find_map(|b| b.managed_base())
        })
    }

    /// Bind the managed base unless one is already bound
    pub(crate) fn bind_managed_base(&self, base: &TypeRef) {
        if self.managed_base().is_none() {
            let _ = self.managed_base.set(Arc::clone(base));
        }
    }

    /// Set (or replace) a class attribute
    pub fn set_attr(&self, name: impl Into<String>, value: ScriptValue) {
        self.attrs.write().insert(name.into(), value);
    }

    /// Remove a class attribute
    pub fn remove_attr(&self, name: &str) -> Option<ScriptValue> {
        self.attrs.write().remove(name)
    }

    /// Attribute defined on this class itself
    pub fn get_own(&self, name: &str) -> Option<ScriptValue> {
        self.attrs.read().get(name).cloned()
    }

    /// Snapshot of this class's own attributes, sorted by name
    pub fn attributes(&self) -> Vec<(String, ScriptValue)> {
        let mut attrs: Vec<_> = self
            .attrs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        attrs.sort_by(|a, b| a.0.cmp(&b.0));
        attrs
    }

    /// Resolve an attribute: own attributes, scripting bases, then the
    /// members bridged from the managed base
    pub fn lookup(&self, name: &str) -> Option<ScriptValue> {
        if let Some(value) = self.lookup_scripted(name) {
            return Some(value);
        }
        self.managed_base().and_then(|base| bridged_member(base, name))
    }

    /// Resolve an attribute defined in scripting only
    pub fn lookup_scripted(&self, name: &str) -> Option<ScriptValue> {
        self.get_own(name)
            .or_else(|| self.bases.iter().find_map(|b| b.lookup_scripted(name)))
    }

    /// Check if `other` is this class or one of its bases
    pub fn is_subclass_of(&self, other: &ScriptClass) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|b| b.is_subclass_of(other))
    }
}

/// Scripting view of a managed member, if `base` has one named `name`
pub(crate) fn bridged_member(base: &TypeRef, name: &str) -> Option<ScriptValue> {
    let is_method = base
        .resolve(name)
        .is_some_and(|m| m.kind == MemberKind::Method);
    let is_property =
        base.resolve(&getter_name(name)).is_some() || base.resolve(&setter_name(name)).is_some();

    (is_method || is_property).then(|| {
        ScriptValue::Managed(ManagedMember {
            declaring: Arc::clone(base),
            name: name.to_string(),
            property: !is_method,
        })
    })
}

impl fmt::Debug for ScriptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptClass")
            .field("name", &self.name)
            .field(
                "bases",
                &self.bases.iter().map(|b| b.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "managed_base",
                &self.managed_base().map(|t| t.qualified_name()),
            )
            .field("attrs", &self.attrs.read().len())
            .finish()
    }
}
