//! Scripting values, callables and errors

use super::gil::Gil;
use super::heap::ScriptRef;
use crate::bridge::{MethodExposure, PropertyExposure};
use crate::managed::{ManagedRef, TypeRef};
use crate::InteropError;
use std::fmt;
use std::sync::Arc;

/// Native body of a scripting callable
///
/// Receives the interpreter lock, the bound receiver (`None` when unbound)
/// and borrowed arguments. Object results are owned references that the
/// caller must release.
pub type ScriptFn = Arc<
    dyn Fn(&Gil<'_>, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError>
        + Send
        + Sync,
>;

/// Box a closure as a [`ScriptFn`]
pub fn script_fn<F>(body: F) -> ScriptFn
where
    F: Fn(&Gil<'_>, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(body)
}

/// A scripting function, optionally carrying method-exposure metadata
pub struct ScriptFunction {
    /// Function name
    pub name: String,
    /// Implementation
    pub body: ScriptFn,
    /// Present when the function is exposed to the managed side
    pub exposure: Option<MethodExposure>,
}

/// A scripting property, optionally carrying property-exposure metadata
pub struct ScriptProperty {
    /// Getter, called with the receiver and no arguments
    pub fget: Option<ScriptFn>,
    /// Setter, called with the receiver and the new value
    pub fset: Option<ScriptFn>,
    /// Present when the property is exposed to the managed side
    pub exposure: Option<PropertyExposure>,
}

/// Scripting view of a member of a managed type
#[derive(Clone)]
pub struct ManagedMember {
    /// Type on which the member was looked up
    pub declaring: TypeRef,
    /// Method slot or property name
    pub name: String,
    /// Property rather than method
    pub property: bool,
}

impl fmt::Debug for ManagedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ManagedMember({}.{}{})",
            self.declaring.qualified_name(),
            self.name,
            if self.property { " [property]" } else { "" }
        )
    }
}

/// A value of the scripting runtime
#[derive(Clone)]
pub enum ScriptValue {
    /// The none value
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(Arc<str>),
    /// Heap object; refcounted explicitly through the [`Gil`]
    Object(ScriptRef),
    /// Callable
    Function(Arc<ScriptFunction>),
    /// Property descriptor
    Property(Arc<ScriptProperty>),
    /// Bridged member of a managed type
    Managed(ManagedMember),
    /// Managed object without a scripting companion
    Opaque(ManagedRef),
}

impl ScriptValue {
    /// Wrap a native closure as a plain function
    pub fn function<F>(name: impl Into<String>, body: F) -> ScriptValue
    where
        F: Fn(&Gil<'_>, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        ScriptValue::Function(Arc::new(ScriptFunction {
            name: name.into(),
            body: Arc::new(body),
            exposure: None,
        }))
    }

    /// Wrap a native closure as a function exposed to the managed side
    pub fn exposed_function<F>(name: impl Into<String>, exposure: MethodExposure, body: F) -> ScriptValue
    where
        F: Fn(&Gil<'_>, &ScriptValue, &[ScriptValue]) -> Result<ScriptValue, ScriptError>
            + Send
            + Sync
            + 'static,
    {
        ScriptValue::Function(Arc::new(ScriptFunction {
            name: name.into(),
            body: Arc::new(body),
            exposure: Some(exposure),
        }))
    }

    /// Build a property from optional getter and setter
    pub fn property(
        fget: Option<ScriptFn>,
        fset: Option<ScriptFn>,
        exposure: Option<PropertyExposure>,
    ) -> ScriptValue {
        ScriptValue::Property(Arc::new(ScriptProperty {
            fget,
            fset,
            exposure,
        }))
    }

    /// Kind name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::None => "NoneType",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "str",
            ScriptValue::Object(_) => "object",
            ScriptValue::Function(_) => "function",
            ScriptValue::Property(_) => "property",
            ScriptValue::Managed(_) => "managed member",
            ScriptValue::Opaque(_) => "managed object",
        }
    }

    /// Check if the value can be called
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            ScriptValue::Function(_) | ScriptValue::Managed(ManagedMember { property: false, .. })
        )
    }

    /// Check if this is none
    pub fn is_none(&self) -> bool {
        matches!(self, ScriptValue::None)
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as heap reference
    pub fn as_object(&self) -> Option<ScriptRef> {
        match self {
            ScriptValue::Object(r) => Some(*r),
            _ => None,
        }
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::None, ScriptValue::None) => true,
            (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
            (ScriptValue::Int(a), ScriptValue::Int(b)) => a == b,
            (ScriptValue::Float(a), ScriptValue::Float(b)) => a == b,
            (ScriptValue::Str(a), ScriptValue::Str(b)) => a == b,
            (ScriptValue::Object(a), ScriptValue::Object(b)) => a == b,
            (ScriptValue::Function(a), ScriptValue::Function(b)) => Arc::ptr_eq(a, b),
            (ScriptValue::Property(a), ScriptValue::Property(b)) => Arc::ptr_eq(a, b),
            (ScriptValue::Managed(a), ScriptValue::Managed(b)) => {
                Arc::ptr_eq(&a.declaring, &b.declaring) && a.name == b.name
            }
            (ScriptValue::Opaque(a), ScriptValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::None => write!(f, "None"),
            ScriptValue::Bool(b) => write!(f, "Bool({})", b),
            ScriptValue::Int(i) => write!(f, "Int({})", i),
            ScriptValue::Float(x) => write!(f, "Float({})", x),
            ScriptValue::Str(s) => write!(f, "Str({:?})", s),
            ScriptValue::Object(r) => write!(f, "Object({:?})", r),
            ScriptValue::Function(func) => write!(f, "Function({})", func.name),
            ScriptValue::Property(_) => write!(f, "Property"),
            ScriptValue::Managed(m) => write!(f, "{:?}", m),
            ScriptValue::Opaque(o) => write!(f, "Opaque({})", o.type_ref().qualified_name()),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Int(value)
    }
}

impl From<f64> for ScriptValue {
    fn from(value: f64) -> Self {
        ScriptValue::Float(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::Str(Arc::from(value))
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::Str(Arc::from(value))
    }
}

/// Exception raised by scripting code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    /// Exception class name
    pub kind: String,
    /// Exception message
    pub message: String,
}

impl ScriptError {
    /// Create an exception of an arbitrary kind
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// `TypeError`
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// `AttributeError`
    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new("AttributeError", message)
    }

    /// `ReferenceError`
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new("ReferenceError", message)
    }

    /// `RuntimeError`
    pub fn runtime_error(message: impl Into<String>) -> Self {
        Self::new("RuntimeError", message)
    }
}

impl From<InteropError> for ScriptError {
    fn from(error: InteropError) -> Self {
        match error {
            InteropError::Script(inner) => inner,
            other => ScriptError::new("ManagedException", other.to_string()),
        }
    }
}
