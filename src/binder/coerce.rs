use super::template::{trace, Extreme};
use crate::error::{BindError, FieldKind};
use crate::source::{find_entry, ConfigValue, SectionPath};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Binds a raw section into `T`.
///
/// `T::default()` is serialized to obtain the defaults of fields absent from the raw
/// section. Traced samples of `T` supply each field's declared kind, including the
/// inner kind of optionals, and the bounds of integer fields. Raw values are coerced
/// into those kinds and overlaid on the defaults.
pub(super) fn bind_value<T>(raw: &ConfigValue, section: &SectionPath) -> Result<T, BindError>
where
    T: super::Settings,
{
    let defaults = serde_json::to_value(T::default())
        .map_err(|e| shape_error::<T>(format!("default value cannot be serialized: {e}")))?;
    let upper = trace::<T>(Extreme::Upper);
    let lower = trace::<T>(Extreme::Lower);

    let template = Template {
        default: Some(&defaults),
        shape: upper.as_ref().unwrap_or(&defaults),
        lower: lower.as_ref(),
        upper: upper.as_ref(),
    };
    let Value::Object(fields) = template.shape else {
        return Err(shape_error::<T>("default value is not a record".to_owned()));
    };
    check_record_shape::<T>(fields, "")?;

    let ConfigValue::Section(entries) = raw else {
        return Err(mismatch(section, FieldKind::Section, raw));
    };

    let merged = overlay_record(template, fields, entries, section)?;

    serde_json::from_value(Value::Object(merged)).map_err(|e| BindError::TypeMismatch {
        path: section.to_string(),
        expected: FieldKind::Section,
        found: e.to_string(),
    })
}

/// One position in the settings record.
///
/// `default` is `None` inside an optional record that has no default; absent fields
/// there are left to the record's own serde defaults.
#[derive(Debug, Clone, Copy)]
struct Template<'a> {
    default: Option<&'a Value>,
    shape: &'a Value,
    lower: Option<&'a Value>,
    upper: Option<&'a Value>,
}

impl<'a> Template<'a> {
    fn field(&self, name: &str, shape: &'a Value) -> Self {
        Self {
            default: self.default.and_then(|v| v.get(name)),
            shape,
            lower: self.lower.and_then(|v| v.get(name)),
            upper: self.upper.and_then(|v| v.get(name)),
        }
    }
}

fn shape_error<T>(reason: String) -> BindError {
    BindError::Shape {
        type_name: std::any::type_name::<T>(),
        reason,
    }
}

fn mismatch(path: &SectionPath, expected: FieldKind, found: &ConfigValue) -> BindError {
    BindError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: found.describe(),
    }
}

// Rejects fields outside {string, integer, float, bool, nested record, optional}.
fn check_record_shape<T>(fields: &Map<String, Value>, prefix: &str) -> Result<(), BindError> {
    for (name, value) in fields {
        match value {
            Value::Array(_) => {
                return Err(shape_error::<T>(format!(
                    "field '{prefix}{name}' is a sequence"
                )));
            }
            Value::Object(inner) => check_record_shape::<T>(inner, &format!("{prefix}{name}."))?,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
    }
    Ok(())
}

fn overlay_record<'a>(
    template: Template<'a>,
    fields: &'a Map<String, Value>,
    raw: &BTreeMap<String, ConfigValue>,
    path: &SectionPath,
) -> Result<Map<String, Value>, BindError> {
    let mut merged = Map::with_capacity(fields.len());
    for (name, shape) in fields {
        let field = template.field(name, shape);
        let value = match (find_entry(raw, name), field.default) {
            (Some(raw_value), _) => coerce(field, raw_value, &path.child(name))?,
            (None, Some(default)) => default.clone(),
            (None, None) => continue,
        };
        merged.insert(name.clone(), value);
    }
    Ok(merged)
}

fn coerce(field: Template<'_>, raw: &ConfigValue, path: &SectionPath) -> Result<Value, BindError> {
    match field.shape {
        Value::Object(fields) => match raw {
            ConfigValue::Section(entries) => {
                Ok(Value::Object(overlay_record(field, fields, entries, path)?))
            }
            _ => Err(mismatch(path, FieldKind::Section, raw)),
        },
        Value::Bool(_) => coerce_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| mismatch(path, FieldKind::Bool, raw)),
        Value::Number(n) if n.is_f64() => coerce_float(raw)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| mismatch(path, FieldKind::Float, raw)),
        Value::Number(_) => coerce_integer(raw)
            .filter(|n| within_bounds(n, field.lower, field.upper))
            .map(Value::Number)
            .ok_or_else(|| mismatch(path, FieldKind::Integer, raw)),
        Value::String(_) => coerce_string(raw)
            .map(Value::String)
            .ok_or_else(|| mismatch(path, FieldKind::String, raw)),
        // Kind unknown (the type could not be traced): let deserialization decide.
        Value::Null => Ok(to_json(raw)),
        Value::Array(_) => Err(BindError::Shape {
            type_name: "sequence",
            reason: format!("field '{path}' is a sequence"),
        }),
    }
}

fn within_bounds(n: &Number, lower: Option<&Value>, upper: Option<&Value>) -> bool {
    let Some(n) = as_i128(n) else {
        return false;
    };
    let bound = |v: Option<&Value>| v.and_then(Value::as_number).and_then(as_i128);
    bound(lower).map_or(true, |lo| n >= lo) && bound(upper).map_or(true, |hi| n <= hi)
}

fn as_i128(n: &Number) -> Option<i128> {
    n.as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from))
}

fn coerce_bool(raw: &ConfigValue) -> Option<bool> {
    match raw {
        ConfigValue::Bool(b) => Some(*b),
        ConfigValue::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Some(true)
            } else if s.eq_ignore_ascii_case("false") {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

#[allow(clippy::cast_precision_loss)]
fn coerce_float(raw: &ConfigValue) -> Option<f64> {
    match raw {
        ConfigValue::Float(f) => Some(*f),
        ConfigValue::Integer(i) => Some(*i as f64),
        ConfigValue::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn coerce_integer(raw: &ConfigValue) -> Option<Number> {
    match raw {
        ConfigValue::Integer(i) => Some(Number::from(*i)),
        ConfigValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Number::from)
                .or_else(|_| s.parse::<u64>().map(Number::from))
                .ok()
        }
        _ => None,
    }
}

fn coerce_string(raw: &ConfigValue) -> Option<String> {
    match raw {
        ConfigValue::String(s) => Some(s.clone()),
        ConfigValue::Integer(i) => Some(i.to_string()),
        ConfigValue::Float(f) => Some(f.to_string()),
        ConfigValue::Bool(b) => Some(b.to_string()),
        ConfigValue::Section(_) => None,
    }
}

fn to_json(raw: &ConfigValue) -> Value {
    match raw {
        ConfigValue::String(s) => Value::String(s.clone()),
        ConfigValue::Integer(i) => Value::from(*i),
        ConfigValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        ConfigValue::Bool(b) => Value::Bool(*b),
        ConfigValue::Section(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}
