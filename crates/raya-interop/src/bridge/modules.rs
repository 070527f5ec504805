//! Generation containers keyed by (assembly, module)

use crate::managed::TypeRef;
use crate::{InteropError, InteropResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::debug;

/// A container of generated types
pub struct GenerationModule {
    assembly: String,
    module: String,
    types: RwLock<FxHashMap<String, TypeRef>>,
}

impl GenerationModule {
    fn new(assembly: &str, module: &str) -> Self {
        Self {
            assembly: assembly.to_string(),
            module: module.to_string(),
            types: RwLock::new(FxHashMap::default()),
        }
    }

    /// Assembly name
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Module name
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Generated type by qualified name
    pub fn get(&self, qualified: &str) -> Option<TypeRef> {
        self.types.read().get(qualified).cloned()
    }

    /// Number of generated types
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Check if no type has been generated here
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    /// Qualified names of the generated types
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Define `qualified` under exclusive access
    ///
    /// An existing entry is returned when `is_same` accepts it and rejected
    /// with `DuplicateType` otherwise; a missing entry is built and stored.
    /// The flag is true when a new type was built.
    pub(crate) fn define(
        &self,
        qualified: &str,
        is_same: impl FnOnce(&TypeRef) -> bool,
        build: impl FnOnce() -> InteropResult<TypeRef>,
    ) -> InteropResult<(TypeRef, bool)> {
        let mut types = self.types.write();
        if let Some(existing) = types.get(qualified) {
            return if is_same(existing) {
                Ok((Arc::clone(existing), false))
            } else {
                Err(InteropError::DuplicateType(qualified.to_string()))
            };
        }
        let ty = build()?;
        types.insert(qualified.to_string(), Arc::clone(&ty));
        Ok((ty, true))
    }

    fn take_all(&self) -> Vec<TypeRef> {
        self.types.write().drain().map(|(_, ty)| ty).collect()
    }
}

/// Registry of generation containers
pub struct ModuleRegistry {
    modules: RwLock<FxHashMap<(String, String), Arc<GenerationModule>>>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(FxHashMap::default()),
        }
    }

    /// Container for `(assembly, module)`, if it exists
    pub fn get(&self, assembly: &str, module: &str) -> Option<Arc<GenerationModule>> {
        self.modules
            .read()
            .get(&(assembly.to_string(), module.to_string()))
            .cloned()
    }

    /// Container for `(assembly, module)`, created on first use
    pub fn get_or_create(&self, assembly: &str, module: &str) -> Arc<GenerationModule> {
        if let Some(existing) = self.get(assembly, module) {
            return existing;
        }
        let mut modules = self.modules.write();
        Arc::clone(
            modules
                .entry((assembly.to_string(), module.to_string()))
                .or_insert_with(|| {
                    debug!(assembly, module, "created generation container");
                    Arc::new(GenerationModule::new(assembly, module))
                }),
        )
    }

    /// Number of containers
    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Check if no container exists
    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }

    /// Drop every container; returns the types they held
    pub fn reset(&self) -> Vec<TypeRef> {
        let modules: Vec<_> = self.modules.write().drain().map(|(_, m)| m).collect();
        modules.iter().flat_map(|m| m.take_all()).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
