//! Scripting runtime model
//!
//! A dynamic runtime with one reentrant interpreter lock per session, a
//! refcounted object heap, classes with mutable attribute dictionaries and
//! native callables. Sessions carry generation tokens so handles that
//! outlive a session can be detected.

mod class;
mod gil;
mod heap;
mod session;
mod value;

pub use class::ScriptClass;
pub(crate) use gil::CompanionRelease;
pub use gil::Gil;
pub use heap::ScriptRef;
pub use session::{ScriptRuntime, Session, SessionToken};
pub use value::{
    script_fn, ManagedMember, ScriptError, ScriptFn, ScriptFunction, ScriptProperty, ScriptValue,
};
