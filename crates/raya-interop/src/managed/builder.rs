//! Builder for managed classes and interfaces

use super::object::{ManagedObject, ManagedRef, ManagedValue};
use super::types::{
    ConstructorInfo, CtorBody, FinalizerBody, ManagedType, MemberInfo, MemberKind, MethodBody,
    Signature, TypeDesc, TypeKind, TypeRef,
};
use super::vtable::VTable;
use super::{getter_name, setter_name};
use crate::bridge::DerivedTypeInfo;
use crate::InteropResult;
use std::sync::Arc;

/// Builder for a [`ManagedType`]
///
/// ```ignore
/// let animal = ManagedTypeBuilder::class("Animal")
///     .namespace("Zoo")
///     .fields(1)
///     .virtual_method("Speak", Signature::returning(TypeDesc::String), |_, _| {
///         Ok(ManagedValue::from("..."))
///     })
///     .build();
/// ```
pub struct ManagedTypeBuilder {
    name: String,
    namespace: String,
    kind: TypeKind,
    parent: Option<TypeRef>,
    interfaces: Vec<TypeRef>,
    new_fields: usize,
    is_sealed: bool,
    is_abstract: bool,
    constructors: Vec<ConstructorInfo>,
    members: Vec<MemberInfo>,
    finalizer: Option<FinalizerBody>,
    derived: Option<DerivedTypeInfo>,
    is_root: bool,
}

impl ManagedTypeBuilder {
    fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            namespace: String::new(),
            kind,
            parent: None,
            interfaces: Vec::new(),
            new_fields: 0,
            is_sealed: false,
            is_abstract: false,
            constructors: Vec::new(),
            members: Vec::new(),
            finalizer: None,
            derived: None,
            is_root: false,
        }
    }

    /// Start a class; it extends the root object unless `extends` is called
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Class)
    }

    /// Start an interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name, TypeKind::Interface)
    }

    pub(crate) fn root_object() -> Self {
        let mut builder = Self::new("Object", TypeKind::Class).namespace("Raya");
        builder.is_root = true;
        builder
    }

    /// Set the namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the superclass
    pub fn extends(mut self, parent: TypeRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: TypeRef) -> Self {
        if !self.interfaces.iter().any(|i| Arc::ptr_eq(i, &interface)) {
            self.interfaces.push(interface);
        }
        self
    }

    /// Declare instance fields in addition to the inherited ones
    pub fn fields(mut self, count: usize) -> Self {
        self.new_fields = count;
        self
    }

    /// Forbid subclassing
    pub fn sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    /// Forbid direct instantiation
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add a constructor overload
    pub fn constructor<F>(self, params: Vec<TypeDesc>, body: F) -> Self
    where
        F: Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<()> + Send + Sync + 'static,
    {
        self.constructor_with(params, Arc::new(body))
    }

    pub(crate) fn constructor_with(mut self, params: Vec<TypeDesc>, body: CtorBody) -> Self {
        self.constructors.push(ConstructorInfo {
            signature: Signature::new(params, TypeDesc::Void),
            body,
        });
        self
    }

    /// Add a non-virtual method
    pub fn method<F>(self, name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<ManagedValue> + Send + Sync + 'static,
    {
        self.member(MemberInfo::new(
            name,
            MemberKind::Method,
            signature,
            Some(Arc::new(body) as MethodBody),
        ))
    }

    /// Add an overridable method
    pub fn virtual_method<F>(self, name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<ManagedValue> + Send + Sync + 'static,
    {
        self.member(
            MemberInfo::new(
                name,
                MemberKind::Method,
                signature,
                Some(Arc::new(body) as MethodBody),
            )
            .as_virtual(),
        )
    }

    /// Add a virtual method that subclasses cannot override
    pub fn sealed_method<F>(self, name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&ManagedRef, &[ManagedValue]) -> InteropResult<ManagedValue> + Send + Sync + 'static,
    {
        self.member(
            MemberInfo::new(
                name,
                MemberKind::Method,
                signature,
                Some(Arc::new(body) as MethodBody),
            )
            .as_virtual()
            .as_final(),
        )
    }

    /// Add a method without a body
    pub fn abstract_method(self, name: impl Into<String>, signature: Signature) -> Self {
        self.member(MemberInfo::new(name, MemberKind::Method, signature, None).as_virtual())
    }

    /// Add an overridable property getter (`get_{property}`)
    pub fn virtual_getter<F>(self, property: &str, ty: TypeDesc, body: F) -> Self
    where
        F: Fn(&ManagedRef) -> InteropResult<ManagedValue> + Send + Sync + 'static,
    {
        let body: MethodBody = Arc::new(move |this: &ManagedRef, _: &[ManagedValue]| body(this));
        self.member(
            MemberInfo::new(
                getter_name(property),
                MemberKind::Getter,
                Signature::returning(ty),
                Some(body),
            )
            .as_virtual(),
        )
    }

    /// Add an overridable property setter (`set_{property}`)
    pub fn virtual_setter<F>(self, property: &str, ty: TypeDesc, body: F) -> Self
    where
        F: Fn(&ManagedRef, ManagedValue) -> InteropResult<()> + Send + Sync + 'static,
    {
        let body: MethodBody = Arc::new(move |this: &ManagedRef, args: &[ManagedValue]| {
            let value = args.first().cloned().unwrap_or(ManagedValue::Null);
            body(this, value).map(|_| ManagedValue::Null)
        });
        self.member(
            MemberInfo::new(
                setter_name(property),
                MemberKind::Setter,
                Signature::new(vec![ty], TypeDesc::Void),
                Some(body),
            )
            .as_virtual(),
        )
    }

    /// Add an abstract property getter
    pub fn abstract_getter(self, property: &str, ty: TypeDesc) -> Self {
        self.member(
            MemberInfo::new(
                getter_name(property),
                MemberKind::Getter,
                Signature::returning(ty),
                None,
            )
            .as_virtual(),
        )
    }

    /// Add an abstract property setter
    pub fn abstract_setter(self, property: &str, ty: TypeDesc) -> Self {
        self.member(
            MemberInfo::new(
                setter_name(property),
                MemberKind::Setter,
                Signature::new(vec![ty], TypeDesc::Void),
                None,
            )
            .as_virtual(),
        )
    }

    pub(crate) fn member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    /// Set the finalizer; inherited finalizers still run after it
    pub fn finalizer<F>(mut self, body: F) -> Self
    where
        F: Fn(&ManagedObject) + Send + Sync + 'static,
    {
        self.finalizer = Some(Arc::new(body));
        self
    }

    pub(crate) fn derived(mut self, info: DerivedTypeInfo) -> Self {
        self.derived = Some(info);
        self
    }

    /// Build the immutable type
    pub fn build(self) -> TypeRef {
        let is_interface = self.kind == TypeKind::Interface;

        let parent = if is_interface || self.is_root {
            None
        } else {
            Some(self.parent.unwrap_or_else(ManagedType::object))
        };

        let mut vtable = VTable::new();
        for mut member in self.members {
            if is_interface {
                member.is_virtual = true;
                member.is_final = false;
                member.body = None;
            }
            vtable.add_member(member);
        }

        let mut constructors = self.constructors;
        if constructors.is_empty() && !is_interface {
            constructors.push(ConstructorInfo {
                signature: Signature::returning(TypeDesc::Void),
                body: Arc::new(|_: &ManagedRef, _: &[ManagedValue]| Ok(())),
            });
        }

        let inherited_fields = parent.as_ref().map_or(0, |p| p.field_count());

        Arc::new(ManagedType {
            name: self.name,
            namespace: self.namespace,
            kind: self.kind,
            parent,
            interfaces: self.interfaces,
            field_count: inherited_fields + self.new_fields,
            is_sealed: self.is_sealed,
            is_abstract: self.is_abstract || is_interface,
            constructors,
            vtable,
            finalizer: self.finalizer,
            derived: self.derived,
        })
    }
}
