//! Managed type metadata: type descriptors, signatures, members and classes

use super::object::{ManagedObject, ManagedRef, ManagedValue};
use super::registry::TypeRegistry;
use super::vtable::VTable;
use super::ManagedTypeBuilder;
use crate::bridge::DerivedTypeInfo;
use crate::{InteropError, InteropResult};
use once_cell::sync::Lazy;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;

/// Shared reference to an immutable managed type
pub type TypeRef = Arc<ManagedType>;

/// Method, getter or setter implementation
pub type MethodBody =
    Arc<dyn Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<ManagedValue> + Send + Sync>;

/// Constructor implementation, run on a freshly allocated instance
pub type CtorBody = Arc<dyn Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<()> + Send + Sync>;

/// Finalizer, run when the last managed reference is dropped
pub type FinalizerBody = Arc<dyn Fn(&ManagedObject) + Send + Sync>;

static OBJECT_TYPE: Lazy<TypeRef> = Lazy::new(|| ManagedTypeBuilder::root_object().build());

static DERIVED_MARKER: Lazy<TypeRef> = Lazy::new(|| {
    ManagedTypeBuilder::interface("IRayaDerived")
        .namespace("Raya.Interop")
        .build()
});

/// Type descriptor used in signatures
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value
    Void,
    /// Boolean
    Bool,
    /// 64-bit integer
    Int,
    /// 64-bit float
    Float,
    /// String (nullable)
    String,
    /// Any value
    Object,
    /// Instance of the named type or a subtype (nullable)
    Class(String),
}

impl TypeDesc {
    /// Parse a declarative descriptor
    ///
    /// Accepts the primitive keywords and the qualified name of any type
    /// known to `types`.
    pub fn parse(descriptor: &str, types: &TypeRegistry) -> Option<TypeDesc> {
        match descriptor.trim() {
            "" => None,
            "void" => Some(TypeDesc::Void),
            "bool" => Some(TypeDesc::Bool),
            "int" => Some(TypeDesc::Int),
            "float" => Some(TypeDesc::Float),
            "string" | "str" => Some(TypeDesc::String),
            "object" => Some(TypeDesc::Object),
            name => types.get(name).map(|ty| TypeDesc::Class(ty.qualified_name())),
        }
    }

    /// Check whether a managed value fits this descriptor
    pub fn accepts(&self, value: &ManagedValue) -> bool {
        match (self, value) {
            (TypeDesc::Void, ManagedValue::Null) => true,
            (TypeDesc::Bool, ManagedValue::Bool(_)) => true,
            (TypeDesc::Int, ManagedValue::Int(_)) => true,
            (TypeDesc::Float, ManagedValue::Float(_)) => true,
            (TypeDesc::String, ManagedValue::Str(_) | ManagedValue::Null) => true,
            (TypeDesc::Object, _) => true,
            (TypeDesc::Class(_), ManagedValue::Null) => true,
            (TypeDesc::Class(name), ManagedValue::Object(obj)) => {
                obj.type_ref().is_assignable_to(name)
            }
            _ => false,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Void => write!(f, "void"),
            TypeDesc::Bool => write!(f, "bool"),
            TypeDesc::Int => write!(f, "int"),
            TypeDesc::Float => write!(f, "float"),
            TypeDesc::String => write!(f, "string"),
            TypeDesc::Object => write!(f, "object"),
            TypeDesc::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Parameter and return types of a member
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Ordered parameter types
    pub params: Vec<TypeDesc>,
    /// Return type
    pub ret: TypeDesc,
}

impl Signature {
    /// Create a signature
    pub fn new(params: Vec<TypeDesc>, ret: TypeDesc) -> Self {
        Self { params, ret }
    }

    /// Signature of a parameterless member
    pub fn returning(ret: TypeDesc) -> Self {
        Self::new(Vec::new(), ret)
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check arity and argument types without building an error
    pub fn accepts(&self, args: &[ManagedValue]) -> bool {
        args.len() == self.params.len()
            && self.params.iter().zip(args).all(|(p, a)| p.accepts(a))
    }

    /// Validate arguments for a call to `member`
    pub fn check_args(&self, member: &str, args: &[ManagedValue]) -> InteropResult<()> {
        if args.len() != self.params.len() {
            return Err(InteropError::ArityMismatch {
                member: member.to_string(),
                expected: self.params.len(),
                found: args.len(),
            });
        }
        for (param, arg) in self.params.iter().zip(args) {
            if !param.accepts(arg) {
                return Err(InteropError::Conversion {
                    expected: param.to_string(),
                    found: arg.type_name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// What a vtable slot implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Ordinary method
    Method,
    /// Property getter (`get_X`)
    Getter,
    /// Property setter (`set_X`)
    Setter,
}

/// A method or property accessor slot
#[derive(Clone)]
pub struct MemberInfo {
    /// Slot name (`Greet`, `get_Name`, `set_Name`)
    pub name: String,
    /// Slot kind
    pub kind: MemberKind,
    /// Signature
    pub signature: Signature,
    /// Dispatched through the vtable of the runtime type
    pub is_virtual: bool,
    /// Virtual but sealed against further overriding
    pub is_final: bool,
    /// Implementation; `None` for abstract members
    pub body: Option<MethodBody>,
}

impl MemberInfo {
    /// Create a member
    pub fn new(
        name: impl Into<String>,
        kind: MemberKind,
        signature: Signature,
        body: Option<MethodBody>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            signature,
            is_virtual: false,
            is_final: false,
            body,
        }
    }

    /// Mark as virtual
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Mark as final
    pub fn as_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Check if the member has no implementation
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// Check if a subclass may override this member
    pub fn is_overridable(&self) -> bool {
        self.is_virtual && !self.is_final
    }

    /// Name under which scripting sees this member
    ///
    /// Accessors map to their property name, methods to their own name.
    pub fn script_name(&self) -> &str {
        match self.kind {
            MemberKind::Method => &self.name,
            MemberKind::Getter => self.name.strip_prefix("get_").unwrap_or(&self.name),
            MemberKind::Setter => self.name.strip_prefix("set_").unwrap_or(&self.name),
        }
    }
}

impl fmt::Debug for MemberInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .field("is_virtual", &self.is_virtual)
            .field("is_final", &self.is_final)
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// A constructor overload
#[derive(Clone)]
pub struct ConstructorInfo {
    /// Parameter list (return type is always void)
    pub signature: Signature,
    /// Implementation
    pub body: CtorBody,
}

impl fmt::Debug for ConstructorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorInfo")
            .field("params", &self.signature.params)
            .finish()
    }
}

/// Class or interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Instantiable (unless abstract) class
    Class,
    /// Interface: members are abstract and virtual
    Interface,
}

/// Immutable managed type
pub struct ManagedType {
    pub(crate) name: String,
    pub(crate) namespace: String,
    pub(crate) kind: TypeKind,
    pub(crate) parent: Option<TypeRef>,
    pub(crate) interfaces: Vec<TypeRef>,
    pub(crate) field_count: usize,
    pub(crate) is_sealed: bool,
    pub(crate) is_abstract: bool,
    pub(crate) constructors: Vec<ConstructorInfo>,
    pub(crate) vtable: VTable,
    pub(crate) finalizer: Option<FinalizerBody>,
    pub(crate) derived: Option<DerivedTypeInfo>,
}

impl ManagedType {
    /// The neutral root class every class ultimately extends
    pub fn object() -> TypeRef {
        Arc::clone(&OBJECT_TYPE)
    }

    /// Marker interface implemented by every bridge-generated type
    pub fn derived_marker() -> TypeRef {
        Arc::clone(&DERIVED_MARKER)
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace (may be empty)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `namespace.name`, or just `name` without a namespace
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Class or interface
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Check if this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// Superclass (None for the root and for interfaces)
    pub fn parent(&self) -> Option<&TypeRef> {
        self.parent.as_ref()
    }

    /// Directly implemented interfaces
    pub fn interfaces(&self) -> &[TypeRef] {
        &self.interfaces
    }

    /// Number of instance fields, including inherited ones
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Check if the type forbids subclassing
    pub fn is_sealed(&self) -> bool {
        self.is_sealed
    }

    /// Check if the type is abstract
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Constructor overloads
    pub fn constructors(&self) -> &[ConstructorInfo] {
        &self.constructors
    }

    /// Members declared (or overridden) by this type itself
    pub fn vtable(&self) -> &VTable {
        &self.vtable
    }

    /// Generation data, present only on bridge-generated types
    pub fn derived(&self) -> Option<&DerivedTypeInfo> {
        self.derived.as_ref()
    }

    /// Check if instances carry a companion handle
    pub fn has_companion_slot(&self) -> bool {
        self.derived.is_some()
    }

    /// Check if the type carries the bridge marker interface
    pub fn is_bridge_generated(&self) -> bool {
        self.implements(&DERIVED_MARKER.qualified_name())
    }

    /// Resolve a slot, most-derived definition first
    pub fn resolve(&self, slot: &str) -> Option<&MemberInfo> {
        self.vtable
            .get(slot)
            .or_else(|| self.parent.as_deref().and_then(|p| p.resolve(slot)))
            .or_else(|| self.interfaces.iter().find_map(|i| i.resolve(slot)))
    }

    /// Check if a type of the given qualified name is implemented
    pub fn implements(&self, qualified: &str) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.qualified_name() == qualified || i.implements(qualified))
            || self.parent.as_deref().is_some_and(|p| p.implements(qualified))
    }

    /// Check if values of this type fit a slot typed as `qualified`
    pub fn is_assignable_to(&self, qualified: &str) -> bool {
        self.qualified_name() == qualified
            || self.implements(qualified)
            || self
                .parent
                .as_deref()
                .is_some_and(|p| p.is_assignable_to(qualified))
    }

    /// Every member a subclass may override
    ///
    /// The most-derived definition of each slot wins; a final or
    /// non-virtual redefinition hides the virtual one below it.
    pub fn overridable_members(&self) -> Vec<MemberInfo> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        self.collect_overridable(&mut seen, &mut out);
        out
    }

    fn collect_overridable(&self, seen: &mut FxHashSet<String>, out: &mut Vec<MemberInfo>) {
        for member in self.vtable.iter() {
            if seen.insert(member.name.clone()) && member.is_overridable() {
                out.push(member.clone());
            }
        }
        if let Some(parent) = &self.parent {
            parent.collect_overridable(seen, out);
        }
        for iface in &self.interfaces {
            iface.collect_overridable(seen, out);
        }
    }

    /// Allocate an instance and run the first constructor accepting `args`
    pub fn instantiate(self: &Arc<Self>, args: &[ManagedValue]) -> InteropResult<ManagedRef> {
        if self.is_interface() || self.is_abstract {
            return Err(InteropError::NotInstantiable(self.qualified_name()));
        }
        let ctor = self
            .constructors
            .iter()
            .find(|c| c.signature.accepts(args))
            .ok_or_else(|| InteropError::NoMatchingConstructor {
                type_name: self.qualified_name(),
                arity: args.len(),
            })?;

        let instance = Arc::new(ManagedObject::new(Arc::clone(self)));
        (ctor.body)(&instance, args)?;
        Ok(instance)
    }

    /// Run this type's finalizer, then the inherited chain
    pub(crate) fn run_finalizer(&self, obj: &ManagedObject) {
        if let Some(finalizer) = &self.finalizer {
            finalizer(obj);
        }
        if let Some(parent) = &self.parent {
            parent.run_finalizer(obj);
        }
    }
}

impl fmt::Debug for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedType")
            .field("name", &self.qualified_name())
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.qualified_name()))
            .field(
                "interfaces",
                &self
                    .interfaces
                    .iter()
                    .map(|i| i.qualified_name())
                    .collect::<Vec<_>>(),
            )
            .field("field_count", &self.field_count)
            .field("members", &self.vtable.len())
            .field("generated", &self.derived.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> TypeRef {
        ManagedTypeBuilder::class("Shape")
            .namespace("Geometry")
            .fields(1)
            .virtual_method("Area", Signature::returning(TypeDesc::Float), |_, _| {
                Ok(ManagedValue::Float(0.0))
            })
            .method("Id", Signature::returning(TypeDesc::Int), |_, _| {
                Ok(ManagedValue::Int(7))
            })
            .abstract_method("Name", Signature::returning(TypeDesc::String))
            .abstract_class()
            .build()
    }

    #[test]
    fn test_qualified_name() {
        let ty = shape();
        assert_eq!(ty.qualified_name(), "Geometry.Shape");
        assert_eq!(ManagedType::object().qualified_name(), "Raya.Object");
    }

    #[test]
    fn test_class_extends_root() {
        let ty = shape();
        assert!(ty.is_assignable_to("Raya.Object"));
        assert!(!ty.is_bridge_generated());
    }

    #[test]
    fn test_overridable_members() {
        let ty = shape();
        let mut names: Vec<_> = ty
            .overridable_members()
            .into_iter()
            .map(|m| m.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Area".to_string(), "Name".to_string()]);
    }

    #[test]
    fn test_final_override_hides_virtual() {
        let base = shape();
        let sealed = ManagedTypeBuilder::class("Square")
            .extends(base)
            .member(
                MemberInfo::new(
                    "Area",
                    MemberKind::Method,
                    Signature::returning(TypeDesc::Float),
                    None,
                )
                .as_virtual()
                .as_final(),
            )
            .build();
        let names: Vec<_> = sealed
            .overridable_members()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Name".to_string()]);
    }

    #[test]
    fn test_abstract_not_instantiable() {
        let ty = shape();
        assert!(matches!(
            ty.instantiate(&[]),
            Err(InteropError::NotInstantiable(_))
        ));
    }

    #[test]
    fn test_signature_check() {
        let sig = Signature::new(vec![TypeDesc::Int, TypeDesc::String], TypeDesc::Void);
        assert!(sig.accepts(&[ManagedValue::Int(1), ManagedValue::from("a")]));
        assert!(!sig.accepts(&[ManagedValue::Int(1)]));
        assert!(matches!(
            sig.check_args("f", &[ManagedValue::Bool(true), ManagedValue::Null]),
            Err(InteropError::Conversion { .. })
        ));
    }

    #[test]
    fn test_type_desc_parse() {
        let types = TypeRegistry::new();
        assert_eq!(TypeDesc::parse("int", &types), Some(TypeDesc::Int));
        assert_eq!(
            TypeDesc::parse("Raya.Object", &types),
            Some(TypeDesc::Class("Raya.Object".to_string()))
        );
        assert_eq!(TypeDesc::parse("Nope", &types), None);
        assert_eq!(TypeDesc::parse("  ", &types), None);
    }
}
