//! Raya Interop
//!
//! Lets a dynamic scripting runtime subclass types of a statically-typed
//! managed runtime, override their virtual members, and keep each instance
//! alive exactly as long as either runtime can still reach it.
//!
//! The crate is organised in layers:
//! - `managed`: classes, interfaces, vtables and reference-counted instances
//!   whose `Drop` plays the role of the managed finalizer
//! - `script`: sessions, the reentrant interpreter lock and the refcounted
//!   scripting heap
//! - `marshal`: value conversion between the two sides
//! - `bridge`: derived-type synthesis, dispatch thunks, the weak/strong
//!   companion handle and the deferred finalization queue
//! - `context`: the [`Bridge`] that owns all process-level state

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bridge;
pub mod context;
pub mod managed;
pub mod marshal;
pub mod options;
pub mod script;

pub use bridge::{
    CompanionHandle, DerivedTypeDescriptor, DerivedTypeInfo, DerivedTypeRequest, DispatchBehavior,
    DrainStats, ExplicitMember, FinalizationQueue, GenerationModule, MethodExposure,
    ModuleRegistry, PendingFinalization, PropertyExposure, ReferenceState,
};
pub use context::{Bridge, BridgeCounters};
pub use managed::{
    ManagedObject, ManagedRef, ManagedType, ManagedTypeBuilder, ManagedValue, MemberInfo,
    MemberKind, Signature, TypeDesc, TypeKind, TypeRef, TypeRegistry,
};
pub use options::BridgeOptions;
pub use script::{
    script_fn, Gil, ManagedMember, ScriptClass, ScriptError, ScriptFn, ScriptFunction,
    ScriptProperty, ScriptRef, ScriptRuntime, ScriptValue, Session, SessionToken,
};

/// Errors surfaced by type generation, dispatch and lifetime operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum InteropError {
    /// Malformed exposure metadata on a scripting member
    #[error("Invalid declaration for member '{member}': {reason}")]
    InvalidDeclaration {
        /// Scripting attribute carrying the metadata
        member: String,
        /// What is wrong with it
        reason: String,
    },

    /// A forwarded call reached an abstract member with no override
    #[error("Member '{member}' of '{type_name}' is not implemented")]
    NotImplemented {
        /// Qualified type name
        type_name: String,
        /// Member slot name
        member: String,
    },

    /// The scripting session that owns a handle has ended
    #[error("Scripting runtime is unavailable")]
    RuntimeUnavailable,

    /// Exception raised by scripting code, propagated unchanged
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// A value does not fit the expected type
    #[error("Cannot convert {found} to {expected}")]
    Conversion {
        /// Expected type descriptor
        expected: String,
        /// Actual value kind
        found: String,
    },

    /// Wrong number of arguments
    #[error("Member '{member}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        /// Member slot name
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },

    /// The requested base type cannot be subclassed
    #[error("Type '{type_name}' cannot be subclassed: {reason}")]
    InvalidBaseType {
        /// Qualified type name
        type_name: String,
        /// Why it was rejected
        reason: String,
    },

    /// A different type was already generated under the same name
    #[error("Type '{0}' is already defined with a different declaration")]
    DuplicateType(String),

    /// No constructor accepts the supplied arguments
    #[error("No constructor of '{type_name}' accepts {arity} arguments of the given types")]
    NoMatchingConstructor {
        /// Qualified type name
        type_name: String,
        /// Supplied argument count
        arity: usize,
    },

    /// Member lookup failed
    #[error("Type '{type_name}' has no member '{member}'")]
    MissingMember {
        /// Qualified type name
        type_name: String,
        /// Member slot name
        member: String,
    },

    /// Interfaces and abstract classes have no instances
    #[error("Type '{0}' cannot be instantiated")]
    NotInstantiable(String),

    /// The instance does not carry a companion handle
    #[error("Type '{0}' is not a bridge-generated type")]
    NotDerived(String),
}

/// Result type used throughout the crate
pub type InteropResult<T> = Result<T, InteropError>;
