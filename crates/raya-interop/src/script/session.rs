//! Scripting sessions and the runtime that owns the current one

use super::gil::Gil;
use super::heap::ScriptHeap;
use crate::bridge::lifetime;
use crate::{InteropError, InteropResult};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Generation token identifying one scripting session
///
/// Tokens are never reused, so a handle created in an ended session can be
/// recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    fn next() -> Self {
        static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
        SessionToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw token value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// One live period of the scripting runtime
pub struct Session {
    token: SessionToken,
    pub(crate) state: ReentrantMutex<RefCell<ScriptHeap>>,
    pub(crate) depth: AtomicUsize,
    ended: AtomicBool,
}

impl Session {
    fn new() -> Self {
        Self {
            token: SessionToken::next(),
            state: ReentrantMutex::new(RefCell::new(ScriptHeap::default())),
            depth: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
        }
    }

    /// Generation token
    pub fn token(&self) -> SessionToken {
        self.token
    }

    /// Acquire the interpreter lock (reentrant on the owning thread)
    pub fn lock(&self) -> Gil<'_> {
        Gil::acquire(self)
    }

    /// Check if the session has been shut down
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Unpin every strong companion and free the heap
    ///
    /// Pinned managed instances are released only after the interpreter
    /// lock is dropped, since their finalizers enqueue into the bridge.
    fn teardown(&self) {
        self.ended.store(true, Ordering::Release);
        let released = {
            let gil = self.lock();
            let released = lifetime::sever_for_shutdown(&gil);
            gil.teardown();
            released
        };
        debug!(
            token = self.token.as_u64(),
            unpinned = released.len(),
            "scripting session ended"
        );
        drop(released);
    }
}

/// Owner of the current scripting session
pub struct ScriptRuntime {
    current: RwLock<Option<Arc<Session>>>,
}

impl ScriptRuntime {
    /// Create a runtime with no session
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Start a session unless one is live; returns the live token
    pub fn initialize(&self) -> SessionToken {
        let mut current = self.current.write();
        if let Some(session) = current.as_ref().filter(|s| !s.is_ended()) {
            return session.token();
        }
        let session = Arc::new(Session::new());
        let token = session.token();
        *current = Some(session);
        debug!(token = token.as_u64(), "scripting session started");
        token
    }

    /// Check if a session is live
    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// The live session, if any
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current
            .read()
            .as_ref()
            .filter(|s| !s.is_ended())
            .cloned()
    }

    /// The live session, provided it is the one identified by `token`
    pub fn require(&self, token: SessionToken) -> InteropResult<Arc<Session>> {
        self.current()
            .filter(|s| s.token() == token)
            .ok_or(InteropError::RuntimeUnavailable)
    }

    /// End the live session; returns false if none was live
    pub fn shutdown(&self) -> bool {
        let session = self.current.write().take();
        match session {
            Some(session) if !session.is_ended() => {
                session.teardown();
                true
            }
            _ => false,
        }
    }
}

impl Default for ScriptRuntime {
    fn default() -> Self {
        Self::new()
    }
}
