//! Value conversion between the managed and scripting runtimes

use crate::bridge::lifetime;
use crate::managed::{ManagedValue, TypeDesc};
use crate::script::{Gil, ScriptValue};
use crate::{InteropError, InteropResult};

/// Convert a managed value to an owned scripting value
///
/// Instances of bridge-generated types are exposed as their companion
/// (which may promote the companion handle); other managed objects are
/// passed as opaque references.
pub fn to_script(gil: &Gil<'_>, value: &ManagedValue) -> InteropResult<ScriptValue> {
    Ok(match value {
        ManagedValue::Null => ScriptValue::None,
        ManagedValue::Bool(b) => ScriptValue::Bool(*b),
        ManagedValue::Int(i) => ScriptValue::Int(*i),
        ManagedValue::Float(f) => ScriptValue::Float(*f),
        ManagedValue::Str(s) => ScriptValue::Str(s.clone()),
        ManagedValue::Object(obj) if obj.companion().is_some() => lifetime::expose(gil, obj)?,
        ManagedValue::Object(obj) => ScriptValue::Opaque(obj.clone()),
    })
}

/// Convert a scripting value to the managed type `desc`
pub fn from_script(gil: &Gil<'_>, value: &ScriptValue, desc: &TypeDesc) -> InteropResult<ManagedValue> {
    let converted = match (desc, value) {
        (TypeDesc::Void, _) => Some(ManagedValue::Null),
        (TypeDesc::Bool, ScriptValue::Bool(b)) => Some(ManagedValue::Bool(*b)),
        (TypeDesc::Int, ScriptValue::Int(i)) => Some(ManagedValue::Int(*i)),
        (TypeDesc::Float, ScriptValue::Float(f)) => Some(ManagedValue::Float(*f)),
        (TypeDesc::Float, ScriptValue::Int(i)) => Some(ManagedValue::Float(*i as f64)),
        (TypeDesc::String, ScriptValue::Str(s)) => Some(ManagedValue::Str(s.clone())),
        (TypeDesc::String | TypeDesc::Class(_) | TypeDesc::Object, ScriptValue::None) => {
            Some(ManagedValue::Null)
        }
        (TypeDesc::Object, ScriptValue::Bool(b)) => Some(ManagedValue::Bool(*b)),
        (TypeDesc::Object, ScriptValue::Int(i)) => Some(ManagedValue::Int(*i)),
        (TypeDesc::Object, ScriptValue::Float(f)) => Some(ManagedValue::Float(*f)),
        (TypeDesc::Object, ScriptValue::Str(s)) => Some(ManagedValue::Str(s.clone())),
        (TypeDesc::Object | TypeDesc::Class(_), ScriptValue::Object(r)) => gil
            .managed_of(*r)
            .filter(|obj| desc.accepts(&ManagedValue::Object(obj.clone())))
            .map(ManagedValue::Object),
        (TypeDesc::Object | TypeDesc::Class(_), ScriptValue::Opaque(obj)) => {
            let value = ManagedValue::Object(obj.clone());
            desc.accepts(&value).then_some(value)
        }
        _ => None,
    };

    converted.ok_or_else(|| InteropError::Conversion {
        expected: desc.to_string(),
        found: value.type_name().to_string(),
    })
}

/// Convert call arguments; on failure, already-converted values are released
pub fn args_to_script(gil: &Gil<'_>, args: &[ManagedValue]) -> InteropResult<Vec<ScriptValue>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match to_script(gil, arg) {
            Ok(value) => out.push(value),
            Err(e) => {
                release_all(gil, out);
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// Release owned temporaries
pub fn release_all(gil: &Gil<'_>, values: Vec<ScriptValue>) {
    for value in values {
        gil.release(value);
    }
}
