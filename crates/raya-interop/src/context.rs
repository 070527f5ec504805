//! Bridge context
//!
//! A [`Bridge`] owns everything that would otherwise be process-global:
//! - the scripting runtime and its current session
//! - the type registry used for discovery
//! - the generation containers
//! - the deferred finalization queue
//! - options and counters
//!
//! Generated types hold only a weak reference back to it.

use crate::bridge::{self, DerivedTypeRequest, DrainStats, FinalizationQueue, ModuleRegistry};
use crate::managed::{ManagedRef, TypeRef, TypeRegistry};
use crate::options::BridgeOptions;
use crate::script::{Gil, ScriptRuntime, ScriptValue, SessionToken};
use crate::{InteropError, InteropResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Activity counters of a bridge
#[derive(Debug, Default)]
pub struct BridgeCounters {
    pub(crate) types_generated: AtomicU64,
    pub(crate) companions_created: AtomicU64,
    pub(crate) forwarded_calls: AtomicU64,
    pub(crate) fallback_calls: AtomicU64,
    pub(crate) promotions: AtomicU64,
}

impl BridgeCounters {
    /// Derived types generated
    pub fn types_generated(&self) -> u64 {
        self.types_generated.load(Ordering::Relaxed)
    }

    /// Companions constructed
    pub fn companions_created(&self) -> u64 {
        self.companions_created.load(Ordering::Relaxed)
    }

    /// Calls forwarded to scripting overrides
    pub fn forwarded_calls(&self) -> u64 {
        self.forwarded_calls.load(Ordering::Relaxed)
    }

    /// Calls that found no override and ran the base implementation
    pub fn fallback_calls(&self) -> u64 {
        self.fallback_calls.load(Ordering::Relaxed)
    }

    /// Weak to strong promotions
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Reset counters
    pub fn reset(&self) {
        self.types_generated.store(0, Ordering::Relaxed);
        self.companions_created.store(0, Ordering::Relaxed);
        self.forwarded_calls.store(0, Ordering::Relaxed);
        self.fallback_calls.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
    }
}

pub(crate) struct BridgeInner {
    pub(crate) options: BridgeOptions,
    pub(crate) runtime: ScriptRuntime,
    pub(crate) types: TypeRegistry,
    pub(crate) modules: ModuleRegistry,
    pub(crate) finalizers: FinalizationQueue,
    pub(crate) counters: BridgeCounters,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.runtime.shutdown();
    }
}

/// Handle to the bridge context; clones share the same state
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Create a bridge with default options
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    /// Create a bridge with specific options
    ///
    /// No scripting session is started; call [`Bridge::initialize`].
    pub fn with_options(options: BridgeOptions) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                options,
                runtime: ScriptRuntime::new(),
                types: TypeRegistry::new(),
                modules: ModuleRegistry::new(),
                finalizers: FinalizationQueue::new(),
                counters: BridgeCounters::default(),
            }),
        }
    }

    /// Start a scripting session (no-op if one is live)
    pub fn initialize(&self) -> SessionToken {
        self.inner.runtime.initialize()
    }

    /// End the scripting session
    ///
    /// Strong companions are unpinned and the heap is freed. Handles of
    /// the ended session fail with `RuntimeUnavailable` from now on, and
    /// their pending finalizations are discarded.
    pub fn shutdown(&self) -> bool {
        self.inner.runtime.shutdown()
    }

    /// Options
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// Scripting runtime
    pub fn runtime(&self) -> &ScriptRuntime {
        &self.inner.runtime
    }

    /// Type registry used for discovery and type descriptors
    pub fn types(&self) -> &TypeRegistry {
        &self.inner.types
    }

    /// Generation containers
    pub fn modules(&self) -> &ModuleRegistry {
        &self.inner.modules
    }

    /// Deferred finalization queue
    pub fn finalizers(&self) -> &FinalizationQueue {
        &self.inner.finalizers
    }

    /// Activity counters
    pub fn counters(&self) -> &BridgeCounters {
        &self.inner.counters
    }

    /// Generate (or fetch the cached) derived type
    pub fn create_derived_type(&self, request: DerivedTypeRequest) -> InteropResult<TypeRef> {
        bridge::create_derived_type(&self.inner, request)
    }

    /// Run `f` under the interpreter lock of the live session
    pub fn with_gil<R>(&self, f: impl FnOnce(&Gil<'_>) -> R) -> InteropResult<R> {
        let session = self
            .inner
            .runtime
            .current()
            .ok_or(InteropError::RuntimeUnavailable)?;
        let gil = session.lock();
        Ok(f(&gil))
    }

    /// Hand a generated instance to scripting; the result is an owned
    /// reference to its companion
    pub fn expose(&self, gil: &Gil<'_>, instance: &ManagedRef) -> InteropResult<ScriptValue> {
        bridge::lifetime::expose(gil, instance)
    }

    /// Release the finalizations queued since the last drain
    pub fn drain_finalizers(&self) -> DrainStats {
        self.inner
            .finalizers
            .drain(&self.inner.runtime, self.inner.options.max_drain_batch)
    }

    /// Forget every generated type and pending finalization
    ///
    /// Queued finalizations are drained first; whatever a batch limit left
    /// behind is dropped. Existing instances keep working, their types are
    /// simply no longer discoverable or cached. The scripting session is
    /// left running.
    pub fn reset(&self) {
        let drained = self.drain_finalizers();
        let dropped_entries = self.inner.finalizers.clear();
        let dropped = self.inner.modules.reset();
        for ty in &dropped {
            self.inner.types.unregister(ty);
        }
        self.inner.counters.reset();
        debug!(
            types = dropped.len(),
            drained = drained.total(),
            dropped_entries,
            "bridge registries reset"
        );
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_gil_requires_session() {
        let bridge = Bridge::new();
        assert!(matches!(
            bridge.with_gil(|_| ()),
            Err(InteropError::RuntimeUnavailable)
        ));
        bridge.initialize();
        assert_eq!(bridge.with_gil(|gil| gil.depth()).unwrap(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let bridge = Bridge::new();
        let other = bridge.clone();
        let token = bridge.initialize();
        assert_eq!(other.initialize(), token);
        assert!(other.shutdown());
        assert!(!bridge.runtime().is_initialized());
    }
}
