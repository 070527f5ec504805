//! Refcounted scripting heap

use super::class::ScriptClass;
use super::value::ScriptValue;
use crate::managed::ManagedObject;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Handle to an object on the scripting heap
///
/// Plain handles are not counted; ownership is tracked explicitly through
/// [`Gil::incref`](super::Gil::incref) and [`Gil::decref`](super::Gil::decref).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptRef(pub(crate) u64);

impl ScriptRef {
    /// Raw object id
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptRef#{}", self.0)
    }
}

pub(crate) struct ScriptObject {
    pub(crate) class: Arc<ScriptClass>,
    pub(crate) refcount: usize,
    pub(crate) attrs: FxHashMap<String, ScriptValue>,
    /// Linked managed instance, for companions
    pub(crate) managed: Option<Weak<ManagedObject>>,
    /// Not tracked by scripting collection; owned by the managed side
    pub(crate) detached: bool,
    /// Managed side is gone; freed on its last release
    pub(crate) orphaned: bool,
}

impl ScriptObject {
    pub(crate) fn new(class: Arc<ScriptClass>, managed: Option<Weak<ManagedObject>>) -> Self {
        Self {
            class,
            refcount: 1,
            attrs: FxHashMap::default(),
            managed,
            detached: false,
            orphaned: false,
        }
    }

    /// Check if reaching refcount zero must go through the lifetime bridge
    pub(crate) fn is_linked(&self) -> bool {
        self.managed.is_some() && !self.orphaned
    }
}

#[derive(Default)]
pub(crate) struct ScriptHeap {
    pub(crate) objects: FxHashMap<u64, ScriptObject>,
    pub(crate) globals: FxHashMap<String, ScriptValue>,
    next_id: u64,
}

impl ScriptHeap {
    pub(crate) fn allocate(&mut self, object: ScriptObject) -> ScriptRef {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(id, object);
        ScriptRef(id)
    }

    pub(crate) fn get(&self, r: ScriptRef) -> Option<&ScriptObject> {
        self.objects.get(&r.0)
    }

    pub(crate) fn get_mut(&mut self, r: ScriptRef) -> Option<&mut ScriptObject> {
        self.objects.get_mut(&r.0)
    }

    pub(crate) fn remove(&mut self, r: ScriptRef) -> Option<ScriptObject> {
        self.objects.remove(&r.0)
    }
}
