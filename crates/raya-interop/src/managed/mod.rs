//! Managed runtime model
//!
//! Statically-typed classes and interfaces with per-type vtables. Instances
//! are shared through [`ManagedRef`] (an `Arc`); dropping the last reference
//! runs the type's finalizer chain, which is how the managed collector's
//! finalization reaches the bridge.

mod builder;
mod object;
mod registry;
mod types;
mod vtable;

pub use builder::ManagedTypeBuilder;
pub use object::{ManagedObject, ManagedRef, ManagedValue};
pub use registry::TypeRegistry;
pub use types::{
    ConstructorInfo, CtorBody, FinalizerBody, ManagedType, MemberInfo, MemberKind, MethodBody,
    Signature, TypeDesc, TypeKind, TypeRef,
};
pub use vtable::VTable;

/// Slot name of a property getter
pub fn getter_name(property: &str) -> String {
    format!("get_{}", property)
}

/// Slot name of a property setter
pub fn setter_name(property: &str) -> String {
    format!("set_{}", property)
}
