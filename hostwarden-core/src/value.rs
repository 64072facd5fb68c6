//! Item field values and the declared type grammar they validate against.
//!
//! Mirrors the dynamic `(key_field_name, {field_name -> type})` pairs a
//! plugin declares as a proper sum type instead of runtime type tags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The declared type of a single item field.
///
/// `List` and `Set` both wire-serialize as JSON arrays (sets have no native
/// JSON representation), but only `List` compares element-wise; `Set`
/// compares by membership, ignoring order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Text,
    Dict,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Any,
}

/// A single field value inside an [`Item`](crate::plugin::Item).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Dict(BTreeMap<String, Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Null,
}

impl Value {
    /// Value equality as used by the diff engine: ordered for lists,
    /// membership-only for sets, structural for everything else.
    fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Set(xs), Value::Set(ys)) => sets_equal(xs, ys),
            (Value::List(xs), Value::List(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| Value::values_equal(x, y))
            }
            _ => a == b,
        }
    }
}

fn sets_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in a {
        for (i, y) in b.iter().enumerate() {
            if !used[i] && Value::values_equal(x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::List(a), Value::List(b)) => Value::values_equal(&Value::List(a.clone()), &Value::List(b.clone())),
            (Value::Set(a), Value::Set(b)) => sets_equal(a, b),
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

/// Result of folding an [`Item`](crate::plugin::Item) over its plugin's spec.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Spec keys that were missing from the item (warning-level per spec).
    pub missing_fields: Vec<String>,
}

/// Raised when an item fails structural validation against its plugin's spec.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SpecViolation {
    #[error("key `{key}` not present in plugin spec (value: {value:?})")]
    UnknownKey { key: String, value: Value },
    #[error("key `{key}` expected type {expected:?}, got {actual:?}")]
    TypeMismatch {
        key: String,
        expected: FieldType,
        actual: Value,
    },
}

/// Structural fold validating a single item's fields against the declared
/// per-key types. Unknown keys are errors; missing spec keys are warnings
/// surfaced via the returned report rather than failing validation.
pub fn validate_item(
    spec: &BTreeMap<String, FieldType>,
    item: &BTreeMap<String, Value>,
) -> Result<ValidationReport, SpecViolation> {
    for (key, value) in item {
        let field_type = spec.get(key).ok_or_else(|| SpecViolation::UnknownKey {
            key: key.clone(),
            value: value.clone(),
        })?;
        check_type(key, field_type, value)?;
    }

    let missing_fields = spec
        .keys()
        .filter(|key| !item.contains_key(*key))
        .cloned()
        .collect();

    Ok(ValidationReport { missing_fields })
}

fn check_type(key: &str, field_type: &FieldType, value: &Value) -> Result<(), SpecViolation> {
    let matches = match (field_type, value) {
        (_, Value::Null) => true,
        (FieldType::Any, _) => true,
        (FieldType::Int, Value::Int(_)) => true,
        (FieldType::Float, Value::Float(_)) | (FieldType::Float, Value::Int(_)) => true,
        (FieldType::Bool, Value::Bool(_)) => true,
        (FieldType::Text, Value::Text(_)) => true,
        (FieldType::Dict, Value::Dict(_)) => true,
        (FieldType::List(inner), Value::List(items)) => {
            return items
                .iter()
                .try_for_each(|item| check_type(key, inner, item));
        }
        (FieldType::Set(inner), Value::Set(items)) => {
            return items
                .iter()
                .try_for_each(|item| check_type(key, inner, item));
        }
        _ => false,
    };

    if matches {
        Ok(())
    } else {
        Err(SpecViolation::TypeMismatch {
            key: key.to_string(),
            expected: field_type.clone(),
            actual: value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_list_equality_is_positional() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(a, b);
    }

    #[test]
    fn set_equality_ignores_order() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::Set(vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn set_equality_checks_multiplicity() {
        let a = Value::Set(vec![Value::Int(1), Value::Int(1)]);
        let b = Value::Set(vec![Value::Int(1), Value::Int(2)]);
        assert_ne!(a, b);
    }

    #[test]
    fn validate_item_flags_unknown_key() {
        let mut spec = BTreeMap::new();
        spec.insert("running".to_string(), FieldType::Bool);

        let mut item = BTreeMap::new();
        item.insert("pid".to_string(), Value::Int(42));

        assert!(matches!(
            validate_item(&spec, &item),
            Err(SpecViolation::UnknownKey { .. })
        ));
    }

    #[test]
    fn validate_item_warns_on_missing_field() {
        let mut spec = BTreeMap::new();
        spec.insert("running".to_string(), FieldType::Bool);
        spec.insert("pid".to_string(), FieldType::Int);

        let mut item = BTreeMap::new();
        item.insert("running".to_string(), Value::Bool(true));

        let report = validate_item(&spec, &item).unwrap();
        assert_eq!(report.missing_fields, vec!["pid".to_string()]);
    }

    #[test]
    fn validate_item_rejects_type_mismatch() {
        let mut spec = BTreeMap::new();
        spec.insert("pid".to_string(), FieldType::Int);

        let mut item = BTreeMap::new();
        item.insert("pid".to_string(), Value::Text("not a number".to_string()));

        assert!(matches!(
            validate_item(&spec, &item),
            Err(SpecViolation::TypeMismatch { .. })
        ));
    }
}
