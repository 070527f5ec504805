//! The interpreter lock and every operation that touches the scripting heap
//!
//! A [`Gil`] is an RAII guard over a session's reentrant lock. Heap borrows
//! are scoped to single statements: no borrow is held while a callable runs
//! or while a value that may own a managed reference is dropped.

use super::class::{bridged_member, ScriptClass};
use super::heap::{ScriptHeap, ScriptObject, ScriptRef};
use super::session::{Session, SessionToken};
use super::value::{ScriptError, ScriptValue};
use crate::bridge::{dispatch, lifetime};
use crate::managed::{ManagedObject, ManagedRef};
use parking_lot::ReentrantMutexGuard;
use std::cell::RefCell;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

/// Outcome of releasing a companion from the finalization queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompanionRelease {
    /// Refcount was zero; the object was freed
    Freed,
    /// Still referenced from scripting; freed on its last release
    Orphaned,
    /// Already gone
    Missing,
}

/// Held interpreter lock
pub struct Gil<'s> {
    session: &'s Session,
    guard: ReentrantMutexGuard<'s, RefCell<ScriptHeap>>,
}

impl<'s> Gil<'s> {
    pub(crate) fn acquire(session: &'s Session) -> Self {
        let guard = session.state.lock();
        session.depth.fetch_add(1, Ordering::AcqRel);
        Self { session, guard }
    }

    /// The session this lock belongs to
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// Generation token of the session
    pub fn token(&self) -> SessionToken {
        self.session.token()
    }

    /// Nesting depth of the lock on this thread (1 = outermost)
    pub fn depth(&self) -> usize {
        self.session.depth.load(Ordering::Acquire)
    }

    fn heap(&self) -> &RefCell<ScriptHeap> {
        &self.guard
    }

    // ===== Objects =====

    /// Allocate an instance of `class` holding one reference
    pub fn new_object(&self, class: &Arc<ScriptClass>) -> ScriptRef {
        self.heap()
            .borrow_mut()
            .allocate(ScriptObject::new(Arc::clone(class), None))
    }

    pub(crate) fn new_companion(&self, class: &Arc<ScriptClass>, managed: &ManagedRef) -> ScriptRef {
        self.heap().borrow_mut().allocate(ScriptObject::new(
            Arc::clone(class),
            Some(Arc::downgrade(managed)),
        ))
    }

    /// Current refcount, or `None` for a freed object
    pub fn refcount(&self, r: ScriptRef) -> Option<usize> {
        self.heap().borrow().get(r).map(|o| o.refcount)
    }

    /// Check if the object has not been freed
    pub fn is_alive(&self, r: ScriptRef) -> bool {
        self.heap().borrow().get(r).is_some()
    }

    /// Number of objects on the heap
    pub fn object_count(&self) -> usize {
        self.heap().borrow().objects.len()
    }

    /// Take a reference
    pub fn incref(&self, r: ScriptRef) {
        if let Some(obj) = self.heap().borrow_mut().get_mut(r) {
            obj.refcount += 1;
        }
    }

    /// Drop a reference
    ///
    /// At zero, a companion still linked to its managed instance is handed
    /// to the lifetime bridge instead of being freed.
    pub fn decref(&self, r: ScriptRef) {
        let linked = {
            let mut heap = self.heap().borrow_mut();
            let Some(obj) = heap.get_mut(r) else {
                return;
            };
            obj.refcount = obj.refcount.saturating_sub(1);
            if obj.refcount > 0 {
                return;
            }
            obj.is_linked()
        };
        if linked {
            lifetime::on_scripting_dealloc_requested(self, r);
        } else {
            self.free(r);
        }
    }

    /// Take a reference if `value` is a heap object
    pub fn retain(&self, value: &ScriptValue) {
        if let ScriptValue::Object(r) = value {
            self.incref(*r);
        }
    }

    /// Drop a reference if `value` is a heap object
    pub fn release(&self, value: ScriptValue) {
        if let ScriptValue::Object(r) = value {
            self.decref(r);
        }
    }

    // ===== Attributes =====

    /// Resolve an attribute, returning an owned value
    ///
    /// Class properties take precedence over instance attributes; other
    /// class attributes are found only when the instance has none.
    pub fn get_attr(&self, r: ScriptRef, name: &str) -> Option<ScriptValue> {
        let (class, own) = {
            let heap = self.heap().borrow();
            let obj = heap.get(r)?;
            (Arc::clone(&obj.class), obj.attrs.get(name).cloned())
        };
        let from_class = class.lookup(name);
        let value = match (from_class, own) {
            (Some(prop @ ScriptValue::Property(_)), _) => prop,
            (_, Some(own)) => own,
            (Some(class_value), None) => class_value,
            (None, None) => return None,
        };
        self.retain(&value);
        Some(value)
    }

    /// Resolve an attribute on the managed base only, bypassing overrides
    pub fn get_base_attr(&self, r: ScriptRef, name: &str) -> Option<ScriptValue> {
        let class = self.class_of(r)?;
        class.managed_base().and_then(|base| bridged_member(base, name))
    }

    /// Set an instance attribute
    pub fn set_attr(&self, r: ScriptRef, name: &str, value: &ScriptValue) -> Result<(), ScriptError> {
        self.retain(value);
        let replaced = self
            .heap()
            .borrow_mut()
            .get_mut(r)
            .map(|obj| obj.attrs.insert(name.to_string(), value.clone()));
        match replaced {
            Some(old) => {
                if let Some(old) = old {
                    self.release(old);
                }
                Ok(())
            }
            None => {
                self.release(value.clone());
                Err(ScriptError::reference_error("object has been freed"))
            }
        }
    }

    /// Delete an instance attribute; returns false if it was not set
    pub fn del_attr(&self, r: ScriptRef, name: &str) -> bool {
        let old = self
            .heap()
            .borrow_mut()
            .get_mut(r)
            .and_then(|obj| obj.attrs.remove(name));
        match old {
            Some(old) => {
                self.release(old);
                true
            }
            None => false,
        }
    }

    // ===== Globals =====

    /// Bind a global
    pub fn set_global(&self, name: &str, value: &ScriptValue) {
        self.retain(value);
        let old = self
            .heap()
            .borrow_mut()
            .globals
            .insert(name.to_string(), value.clone());
        if let Some(old) = old {
            self.release(old);
        }
    }

    /// Read a global, returning an owned value
    pub fn get_global(&self, name: &str) -> Option<ScriptValue> {
        let value = self.heap().borrow().globals.get(name).cloned()?;
        self.retain(&value);
        Some(value)
    }

    /// Remove a global
    pub fn del_global(&self, name: &str) -> bool {
        let old = self.heap().borrow_mut().globals.remove(name);
        match old {
            Some(old) => {
                self.release(old);
                true
            }
            None => false,
        }
    }

    // ===== Calls =====

    /// Call a callable with a receiver and borrowed arguments
    pub fn call(
        &self,
        callable: &ScriptValue,
        this: &ScriptValue,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        match callable {
            ScriptValue::Function(func) => (func.body)(self, this, args),
            ScriptValue::Managed(member) => dispatch::call_managed_member(self, member, this, args),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Look up `name` on the object and call it bound to the object
    pub fn call_method(
        &self,
        r: ScriptRef,
        name: &str,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        let callable = self.get_attr(r, name).ok_or_else(|| {
            ScriptError::attribute_error(format!("object has no attribute '{}'", name))
        })?;
        let result = match &callable {
            ScriptValue::Property(prop) => match &prop.fget {
                Some(fget) => fget(self, &ScriptValue::Object(r), &[]),
                None => Err(ScriptError::attribute_error("unreadable attribute")),
            },
            _ => self.call(&callable, &ScriptValue::Object(r), args),
        };
        self.release(callable);
        result
    }

    // ===== Managed link =====

    /// Managed instance linked to a companion, if it is still alive
    pub fn managed_of(&self, r: ScriptRef) -> Option<ManagedRef> {
        let weak = self.heap().borrow().get(r)?.managed.clone()?;
        weak.upgrade()
    }

    /// Class of an object
    pub fn class_of(&self, r: ScriptRef) -> Option<Arc<ScriptClass>> {
        self.heap().borrow().get(r).map(|o| Arc::clone(&o.class))
    }

    /// Check if the object is excluded from scripting collection
    pub fn is_detached(&self, r: ScriptRef) -> bool {
        self.heap().borrow().get(r).is_some_and(|o| o.detached)
    }

    /// Check if the object outlived its managed instance
    pub fn is_orphaned(&self, r: ScriptRef) -> bool {
        self.heap().borrow().get(r).is_some_and(|o| o.orphaned)
    }

    pub(crate) fn detach(&self, r: ScriptRef) {
        if let Some(obj) = self.heap().borrow_mut().get_mut(r) {
            obj.detached = true;
        }
    }

    pub(crate) fn reattach(&self, r: ScriptRef) {
        if let Some(obj) = self.heap().borrow_mut().get_mut(r) {
            obj.detached = false;
        }
    }

    /// Companions currently linked to a managed instance
    pub(crate) fn linked_objects(&self) -> Vec<(ScriptRef, std::sync::Weak<ManagedObject>)> {
        self.heap()
            .borrow()
            .objects
            .iter()
            .filter_map(|(id, obj)| obj.managed.clone().map(|m| (ScriptRef(*id), m)))
            .collect()
    }

    // ===== Disposal =====

    /// Free an object regardless of its refcount
    pub(crate) fn free(&self, r: ScriptRef) {
        let removed = self.heap().borrow_mut().remove(r);
        if let Some(obj) = removed {
            for (_, value) in obj.attrs {
                self.release(value);
            }
        }
    }

    /// Release a companion whose managed instance was finalized
    pub(crate) fn release_companion(&self, r: ScriptRef) -> CompanionRelease {
        let refcount = {
            let mut heap = self.heap().borrow_mut();
            let Some(obj) = heap.get_mut(r) else {
                return CompanionRelease::Missing;
            };
            obj.managed = None;
            if obj.refcount > 0 {
                obj.orphaned = true;
                obj.detached = false;
            }
            obj.refcount
        };
        if refcount == 0 {
            self.free(r);
            CompanionRelease::Freed
        } else {
            warn!(
                companion = r.id(),
                refcount, "companion outlived its managed instance"
            );
            CompanionRelease::Orphaned
        }
    }

    pub(crate) fn teardown(&self) {
        let (objects, globals) = {
            let mut heap = self.heap().borrow_mut();
            (
                std::mem::take(&mut heap.objects),
                std::mem::take(&mut heap.globals),
            )
        };
        drop(globals);
        drop(objects);
    }
}

impl Drop for Gil<'_> {
    fn drop(&mut self) {
        self.session.depth.fetch_sub(1, Ordering::AcqRel);
    }
}
