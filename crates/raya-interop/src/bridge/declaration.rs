//! Declarative exposure metadata on scripting members

use crate::managed::{Signature, TypeDesc, TypeRegistry};
use crate::script::{ScriptClass, ScriptValue};
use crate::{InteropError, InteropResult};

/// Marks a scripting function as a member of the generated managed type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodExposure {
    /// Return type descriptor (required)
    pub return_type: Option<String>,
    /// Parameter type descriptors (required; may be empty)
    pub arg_types: Option<Vec<String>>,
    /// Managed-side name, when different from the attribute name
    pub rename: Option<String>,
}

impl MethodExposure {
    /// Exposure with a full signature
    pub fn new(return_type: &str, arg_types: &[&str]) -> Self {
        Self {
            return_type: Some(return_type.to_string()),
            arg_types: Some(arg_types.iter().map(|s| s.to_string()).collect()),
            rename: None,
        }
    }

    /// Expose under a different managed name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }
}

/// Marks a scripting property as a property of the generated managed type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyExposure {
    /// Property type descriptor (required)
    pub property_type: Option<String>,
    /// Generate a getter; defaults to whether the property has `fget`
    pub getter: Option<bool>,
    /// Generate a setter; defaults to whether the property has `fset`
    pub setter: Option<bool>,
}

impl PropertyExposure {
    /// Exposure of the given type with accessors inferred from the property
    pub fn new(property_type: &str) -> Self {
        Self {
            property_type: Some(property_type.to_string()),
            getter: None,
            setter: None,
        }
    }

    /// Force accessor generation flags
    pub fn accessors(mut self, getter: bool, setter: bool) -> Self {
        self.getter = Some(getter);
        self.setter = Some(setter);
        self
    }
}

/// An exposed scripting method
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExplicitMethod {
    pub(crate) script_name: String,
    pub(crate) managed_name: String,
    pub(crate) signature: Signature,
}

/// An exposed scripting property
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExplicitProperty {
    pub(crate) name: String,
    pub(crate) ty: TypeDesc,
    pub(crate) getter: bool,
    pub(crate) setter: bool,
}

/// All exposure metadata of one scripting class
#[derive(Debug, Default)]
pub(crate) struct Declarations {
    pub(crate) methods: Vec<ExplicitMethod>,
    pub(crate) properties: Vec<ExplicitProperty>,
}

fn invalid(member: &str, reason: impl Into<String>) -> InteropError {
    InteropError::InvalidDeclaration {
        member: member.to_string(),
        reason: reason.into(),
    }
}

fn resolve_type(member: &str, descriptor: &str, types: &TypeRegistry) -> InteropResult<TypeDesc> {
    TypeDesc::parse(descriptor, types)
        .ok_or_else(|| invalid(member, format!("unknown type '{}'", descriptor)))
}

/// Collect and validate the exposure metadata on `class`'s own attributes
pub(crate) fn parse(class: &ScriptClass, types: &TypeRegistry) -> InteropResult<Declarations> {
    let mut decls = Declarations::default();

    for (name, value) in class.attributes() {
        match value {
            ScriptValue::Function(func) => {
                let Some(exposure) = &func.exposure else {
                    continue;
                };
                decls.methods.push(parse_method(&name, exposure, types)?);
            }
            ScriptValue::Property(prop) => {
                let Some(exposure) = &prop.exposure else {
                    continue;
                };
                let ty = exposure
                    .property_type
                    .as_deref()
                    .ok_or_else(|| invalid(&name, "missing property type"))?;
                let ty = resolve_type(&name, ty, types)?;
                if ty == TypeDesc::Void {
                    return Err(invalid(&name, "property type cannot be void"));
                }

                let getter = exposure.getter.unwrap_or(prop.fget.is_some());
                let setter = exposure.setter.unwrap_or(prop.fset.is_some());
                if !getter && !setter {
                    return Err(invalid(&name, "property has neither getter nor setter"));
                }
                if getter && prop.fget.is_none() {
                    return Err(invalid(&name, "getter declared without fget"));
                }
                if setter && prop.fset.is_none() {
                    return Err(invalid(&name, "setter declared without fset"));
                }

                decls.properties.push(ExplicitProperty {
                    name,
                    ty,
                    getter,
                    setter,
                });
            }
            _ => {}
        }
    }

    Ok(decls)
}

fn parse_method(
    name: &str,
    exposure: &MethodExposure,
    types: &TypeRegistry,
) -> InteropResult<ExplicitMethod> {
    let ret = exposure
        .return_type
        .as_deref()
        .ok_or_else(|| invalid(name, "missing return type"))?;
    let ret = resolve_type(name, ret, types)?;

    let arg_types = exposure
        .arg_types
        .as_ref()
        .ok_or_else(|| invalid(name, "missing argument types"))?;
    let mut params = Vec::with_capacity(arg_types.len());
    for arg in arg_types {
        let param = resolve_type(name, arg, types)?;
        if param == TypeDesc::Void {
            return Err(invalid(name, "parameter type cannot be void"));
        }
        params.push(param);
    }

    let managed_name = match exposure.rename.as_deref() {
        Some("") => return Err(invalid(name, "rename must not be empty")),
        Some(rename) => rename.to_string(),
        None => name.to_string(),
    };

    Ok(ExplicitMethod {
        script_name: name.to_string(),
        managed_name,
        signature: Signature::new(params, ret),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::script_fn;

    fn noop() -> ScriptValue {
        ScriptValue::None
    }

    fn exposed(exposure: MethodExposure) -> ScriptValue {
        ScriptValue::exposed_function("f", exposure, |_, _, _| Ok(noop()))
    }

    #[test]
    fn test_parse_method() {
        let types = TypeRegistry::new();
        let class = ScriptClass::new("Py")
            .with_attr("add", exposed(MethodExposure::new("int", &["int", "int"]).renamed("Add")))
            .with_attr("plain", ScriptValue::function("plain", |_, _, _| Ok(noop())));

        let decls = parse(&class, &types).unwrap();
        assert_eq!(decls.methods.len(), 1);
        let method = &decls.methods[0];
        assert_eq!(method.script_name, "add");
        assert_eq!(method.managed_name, "Add");
        assert_eq!(method.signature.params, vec![TypeDesc::Int, TypeDesc::Int]);
    }

    #[test]
    fn test_missing_return_type() {
        let types = TypeRegistry::new();
        let exposure = MethodExposure {
            return_type: None,
            arg_types: Some(vec![]),
            rename: None,
        };
        let class = ScriptClass::new("Py").with_attr("f", exposed(exposure));
        assert!(matches!(
            parse(&class, &types),
            Err(InteropError::InvalidDeclaration { member, .. }) if member == "f"
        ));
    }

    #[test]
    fn test_missing_arg_types() {
        let types = TypeRegistry::new();
        let exposure = MethodExposure {
            return_type: Some("int".to_string()),
            arg_types: None,
            rename: None,
        };
        let class = ScriptClass::new("Py").with_attr("f", exposed(exposure));
        assert!(parse(&class, &types).is_err());
    }

    #[test]
    fn test_unknown_type() {
        let types = TypeRegistry::new();
        let class = ScriptClass::new("Py")
            .with_attr("f", exposed(MethodExposure::new("Nowhere.Type", &[])));
        match parse(&class, &types) {
            Err(InteropError::InvalidDeclaration { reason, .. }) => {
                assert!(reason.contains("Nowhere.Type"))
            }
            other => panic!("expected invalid declaration, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_rename() {
        let types = TypeRegistry::new();
        let class = ScriptClass::new("Py")
            .with_attr("f", exposed(MethodExposure::new("void", &[]).renamed("")));
        assert!(parse(&class, &types).is_err());
    }

    #[test]
    fn test_property_accessors_inferred() {
        let types = TypeRegistry::new();
        let getter = script_fn(|_, _, _| Ok(ScriptValue::Int(1)));
        let class = ScriptClass::new("Py").with_attr(
            "Count",
            ScriptValue::property(Some(getter), None, Some(PropertyExposure::new("int"))),
        );

        let decls = parse(&class, &types).unwrap();
        let prop = &decls.properties[0];
        assert!(prop.getter);
        assert!(!prop.setter);
        assert_eq!(prop.ty, TypeDesc::Int);
    }

    #[test]
    fn test_property_without_type() {
        let types = TypeRegistry::new();
        let getter = script_fn(|_, _, _| Ok(ScriptValue::Int(1)));
        let class = ScriptClass::new("Py").with_attr(
            "Count",
            ScriptValue::property(Some(getter), None, Some(PropertyExposure::default())),
        );
        assert!(parse(&class, &types).is_err());
    }

    #[test]
    fn test_property_without_accessors() {
        let types = TypeRegistry::new();
        let class = ScriptClass::new("Py").with_attr(
            "Count",
            ScriptValue::property(None, None, Some(PropertyExposure::new("int"))),
        );
        assert!(parse(&class, &types).is_err());
    }
}
