//! Process type registry used for discovery

use super::types::{ManagedType, TypeRef};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent registry of managed types, keyed by qualified name
///
/// Seeded with the root object type and the bridge marker interface.
pub struct TypeRegistry {
    /// Qualified name to type
    types: DashMap<String, TypeRef>,
}

impl TypeRegistry {
    /// Create a registry holding the built-in types
    pub fn new() -> Self {
        let registry = Self {
            types: DashMap::new(),
        };
        registry.register(ManagedType::object());
        registry.register(ManagedType::derived_marker());
        registry
    }

    /// Register a type under its qualified name, replacing any previous entry
    pub fn register(&self, ty: TypeRef) {
        self.types.insert(ty.qualified_name(), ty);
    }

    /// Register a type only if its qualified name is free
    ///
    /// Returns false and leaves the registry unchanged when the name is taken.
    pub fn try_register(&self, ty: TypeRef) -> bool {
        match self.types.entry(ty.qualified_name()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ty);
                true
            }
        }
    }

    /// Get a type by qualified name
    pub fn get(&self, qualified: &str) -> Option<TypeRef> {
        self.types.get(qualified).map(|entry| Arc::clone(entry.value()))
    }

    /// Check if a qualified name is registered
    pub fn contains(&self, qualified: &str) -> bool {
        self.types.contains_key(qualified)
    }

    /// Remove a type, but only if the registered entry is that very type
    pub fn unregister(&self, ty: &TypeRef) -> bool {
        self.types
            .remove_if(&ty.qualified_name(), |_, existing| Arc::ptr_eq(existing, ty))
            .is_some()
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Qualified names of all registered types
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
