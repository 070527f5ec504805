//! Companion handle: the weak/strong link from a managed instance to its
//! scripting companion

use super::finalizer::PendingFinalization;
use crate::managed::ManagedRef;
use crate::script::{ScriptRef, SessionToken};
use parking_lot::Mutex;
use std::fmt;
use std::mem;

/// Ownership state of a companion handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceState {
    /// The managed instance keeps the pair alive
    Weak,
    /// Scripting holds references; the managed instance is pinned
    Strong,
}

enum Slot {
    Empty,
    Weak {
        companion: ScriptRef,
        token: SessionToken,
    },
    Strong {
        companion: ScriptRef,
        token: SessionToken,
        pin: ManagedRef,
    },
}

/// Slot embedded in every instance of a generated type
///
/// Pins are always released after the slot mutex is unlocked: dropping a
/// pin may finalize the instance, and finalization locks this slot again.
pub struct CompanionHandle {
    slot: Mutex<Slot>,
}

impl CompanionHandle {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Current state, or `None` when no companion is attached
    pub fn state(&self) -> Option<ReferenceState> {
        match &*self.slot.lock() {
            Slot::Empty => None,
            Slot::Weak { .. } => Some(ReferenceState::Weak),
            Slot::Strong { .. } => Some(ReferenceState::Strong),
        }
    }

    /// Attached companion and the token of the session that created it
    pub fn companion(&self) -> Option<(ScriptRef, SessionToken)> {
        match &*self.slot.lock() {
            Slot::Empty => None,
            Slot::Weak { companion, token } | Slot::Strong { companion, token, .. } => {
                Some((*companion, *token))
            }
        }
    }

    /// Check if a companion is attached
    pub fn is_attached(&self) -> bool {
        !matches!(&*self.slot.lock(), Slot::Empty)
    }

    /// Record a freshly constructed companion as weak
    pub(crate) fn attach_weak(&self, companion: ScriptRef, token: SessionToken) {
        let previous = mem::replace(&mut *self.slot.lock(), Slot::Weak { companion, token });
        drop(previous);
    }

    /// Weak to strong; returns false (and releases `pin`) in any other state
    pub(crate) fn promote(&self, pin: ManagedRef) -> bool {
        let rejected = {
            let mut slot = self.slot.lock();
            match *slot {
                Slot::Weak { companion, token } => {
                    *slot = Slot::Strong {
                        companion,
                        token,
                        pin,
                    };
                    None
                }
                _ => Some(pin),
            }
        };
        let promoted = rejected.is_none();
        drop(rejected);
        promoted
    }

    /// Strong to weak; the returned pin must be dropped by the caller
    /// outside every lock
    pub(crate) fn demote(&self) -> Option<ManagedRef> {
        let mut slot = self.slot.lock();
        match mem::replace(&mut *slot, Slot::Empty) {
            Slot::Strong {
                companion,
                token,
                pin,
            } => {
                *slot = Slot::Weak { companion, token };
                Some(pin)
            }
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Take the companion out for deferred finalization
    ///
    /// A second call finds the slot empty and returns `None`.
    pub(crate) fn take_for_finalization(&self) -> Option<PendingFinalization> {
        let taken = mem::replace(&mut *self.slot.lock(), Slot::Empty);
        match taken {
            Slot::Empty => None,
            Slot::Weak { companion, token } | Slot::Strong { companion, token, .. } => {
                Some(PendingFinalization { companion, token })
            }
        }
    }

    /// Detach without finalization (failed construction)
    pub(crate) fn clear(&self) {
        let previous = mem::replace(&mut *self.slot.lock(), Slot::Empty);
        drop(previous);
    }
}

impl fmt::Debug for CompanionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompanionHandle")
            .field("state", &self.state())
            .field("companion", &self.companion().map(|(c, _)| c))
            .finish()
    }
}
