//! Managed instances and values

use super::types::TypeRef;
use super::{getter_name, setter_name};
use crate::bridge::CompanionHandle;
use crate::{InteropError, InteropResult};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Shared reference to a managed instance
///
/// The managed collector is modelled by reference counting: the instance is
/// finalized when the last `ManagedRef` is dropped.
pub type ManagedRef = Arc<ManagedObject>;

/// A value of the managed runtime
#[derive(Clone)]
pub enum ManagedValue {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Object reference
    Object(ManagedRef),
}

impl ManagedValue {
    /// Kind name used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            ManagedValue::Null => "null",
            ManagedValue::Bool(_) => "bool",
            ManagedValue::Int(_) => "int",
            ManagedValue::Float(_) => "float",
            ManagedValue::Str(_) => "string",
            ManagedValue::Object(_) => "object",
        }
    }

    /// Check if this is null
    pub fn is_null(&self) -> bool {
        matches!(self, ManagedValue::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ManagedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ManagedValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ManagedValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ManagedValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as object reference
    pub fn as_object(&self) -> Option<&ManagedRef> {
        match self {
            ManagedValue::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl PartialEq for ManagedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ManagedValue::Null, ManagedValue::Null) => true,
            (ManagedValue::Bool(a), ManagedValue::Bool(b)) => a == b,
            (ManagedValue::Int(a), ManagedValue::Int(b)) => a == b,
            (ManagedValue::Float(a), ManagedValue::Float(b)) => a == b,
            (ManagedValue::Str(a), ManagedValue::Str(b)) => a == b,
            (ManagedValue::Object(a), ManagedValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ManagedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedValue::Null => write!(f, "Null"),
            ManagedValue::Bool(b) => write!(f, "Bool({})", b),
            ManagedValue::Int(i) => write!(f, "Int({})", i),
            ManagedValue::Float(x) => write!(f, "Float({})", x),
            ManagedValue::Str(s) => write!(f, "Str({:?})", s),
            ManagedValue::Object(o) => write!(f, "Object({})", o.type_ref().qualified_name()),
        }
    }
}

impl From<bool> for ManagedValue {
    fn from(value: bool) -> Self {
        ManagedValue::Bool(value)
    }
}

impl From<i64> for ManagedValue {
    fn from(value: i64) -> Self {
        ManagedValue::Int(value)
    }
}

impl From<f64> for ManagedValue {
    fn from(value: f64) -> Self {
        ManagedValue::Float(value)
    }
}

impl From<&str> for ManagedValue {
    fn from(value: &str) -> Self {
        ManagedValue::Str(Arc::from(value))
    }
}

impl From<String> for ManagedValue {
    fn from(value: String) -> Self {
        ManagedValue::Str(Arc::from(value))
    }
}

impl From<ManagedRef> for ManagedValue {
    fn from(value: ManagedRef) -> Self {
        ManagedValue::Object(value)
    }
}

/// Heap-allocated managed instance
pub struct ManagedObject {
    ty: TypeRef,
    fields: RwLock<Vec<ManagedValue>>,
    companion: Option<CompanionHandle>,
}

impl ManagedObject {
    /// Allocate an instance with null fields
    ///
    /// Instances of bridge-generated types get exactly one companion handle.
    pub(crate) fn new(ty: TypeRef) -> Self {
        let companion = ty.has_companion_slot().then(CompanionHandle::new);
        Self {
            fields: RwLock::new(vec![ManagedValue::Null; ty.field_count()]),
            ty,
            companion,
        }
    }

    /// Runtime type
    pub fn type_ref(&self) -> &TypeRef {
        &self.ty
    }

    /// Companion handle slot, present only on generated types
    pub fn companion(&self) -> Option<&CompanionHandle> {
        self.companion.as_ref()
    }

    /// Get field value by index (null when out of range)
    pub fn get_field(&self, index: usize) -> ManagedValue {
        self.fields
            .read()
            .get(index)
            .cloned()
            .unwrap_or(ManagedValue::Null)
    }

    /// Set field value by index
    pub fn set_field(&self, index: usize, value: ManagedValue) -> Result<(), String> {
        let mut fields = self.fields.write();
        let count = fields.len();
        match fields.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(format!(
                "Field index {} out of bounds (field count: {})",
                index, count
            )),
        }
    }

    /// Virtual call through the runtime type's vtable
    pub fn call(self: &Arc<Self>, member: &str, args: &[ManagedValue]) -> InteropResult<ManagedValue> {
        let info = self
            .ty
            .resolve(member)
            .ok_or_else(|| InteropError::MissingMember {
                type_name: self.ty.qualified_name(),
                member: member.to_string(),
            })?;
        info.signature.check_args(member, args)?;
        match &info.body {
            Some(body) => body(self, args),
            None => Err(InteropError::NotImplemented {
                type_name: self.ty.qualified_name(),
                member: member.to_string(),
            }),
        }
    }

    /// Read a property through its virtual getter
    pub fn get(self: &Arc<Self>, property: &str) -> InteropResult<ManagedValue> {
        self.call(&getter_name(property), &[])
    }

    /// Write a property through its virtual setter
    pub fn set(self: &Arc<Self>, property: &str, value: ManagedValue) -> InteropResult<()> {
        self.call(&setter_name(property), &[value]).map(|_| ())
    }

    /// Check if this instance's type descends from `qualified`
    pub fn is_instance_of(&self, qualified: &str) -> bool {
        self.ty.is_assignable_to(qualified)
    }
}

impl Drop for ManagedObject {
    fn drop(&mut self) {
        let ty = Arc::clone(&self.ty);
        ty.run_finalizer(self);
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("type", &self.ty.qualified_name())
            .field("fields", &self.fields.read().len())
            .field("companion", &self.companion)
            .finish()
    }
}
