// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Typed values and the adapters that coerce raw values against a declared `ValueType`.
//!
//! An adapter is a pure function `(declared_type, raw_value) -> coerced_value | TypeMismatch`.
//! Containers are validated one level deep: a `List(Int)` adapter checks that every element
//! adapts to `Int`, but does not chase further nesting beyond that single element type.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::error::{Error, Result};

/// The declared type of a property. Mirrors `Value` one level deep; unknown/unsupported shapes
/// are rejected when a schema is built rather than at each individual `set`/`get`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
    NoneType,
    Path,
    List(Box<ValueType>),
    Set(Box<ValueType>),
    Map(Box<ValueType>),
    Union(Vec<ValueType>),
}

/// A dynamically typed value flowing through properties and suppliers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Path(PathBuf),
    None,
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Path(_) => "path",
            Value::None => "none",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<PathBuf> for Value {
    fn from(v: PathBuf) -> Self {
        Value::Path(v)
    }
}

fn mismatch(expected: &ValueType, got: &Value) -> Error {
    Error::TypeMismatch {
        expected: expected.clone(),
        got: format!("{} ({:?})", got.type_name(), got),
    }
}

/// Coerces `raw` against `declared`, applying the built-in adapters.
///
/// Union types attempt each alternative in declaration order and return the first success; this
/// is observable (`Union(String, Path)` stores a string unchanged, `Union(Path, String)` coerces
/// strings to paths).
pub fn adapt(declared: &ValueType, raw: &Value) -> Result<Value> {
    match declared {
        ValueType::Bool => match raw {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Int => match raw {
            Value::Int(i) => Ok(Value::Int(*i)),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Float => match raw {
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::String => match raw {
            Value::String(s) => Ok(Value::String(s.clone())),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::NoneType => match raw {
            Value::None => Ok(Value::None),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Path => match raw {
            Value::Path(p) => Ok(Value::Path(p.clone())),
            Value::String(s) => Ok(Value::Path(PathBuf::from(s))),
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::List(elem) => match raw {
            Value::List(items) => {
                let coerced = items
                    .iter()
                    .map(|item| adapt(elem, item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(coerced))
            }
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Set(elem) => match raw {
            Value::Set(items) | Value::List(items) => {
                let mut coerced = Vec::with_capacity(items.len());
                for item in items {
                    let item = adapt(elem, item)?;
                    if !coerced.contains(&item) {
                        coerced.push(item);
                    }
                }
                Ok(Value::Set(coerced))
            }
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Map(elem) => match raw {
            Value::Map(entries) => {
                let mut coerced = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    coerced.insert(key.clone(), adapt(elem, value)?);
                }
                Ok(Value::Map(coerced))
            }
            _ => Err(mismatch(declared, raw)),
        },
        ValueType::Union(alternatives) => {
            for alternative in alternatives {
                if let Ok(value) = adapt(alternative, raw) {
                    return Ok(value);
                }
            }
            Err(mismatch(declared, raw))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_round_trips() {
        assert_eq!(adapt(&ValueType::Bool, &Value::Bool(true)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn int_rejects_string() {
        assert!(adapt(&ValueType::Int, &Value::String("1".into())).is_err());
    }

    #[test]
    fn float_widens_int() {
        assert_eq!(adapt(&ValueType::Float, &Value::Int(3)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn path_coerces_string() {
        assert_eq!(
            adapt(&ValueType::Path, &Value::String("out.txt".into())).unwrap(),
            Value::Path(PathBuf::from("out.txt"))
        );
    }

    #[test]
    fn list_validates_elements_one_level_deep() {
        let raw = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            adapt(&ValueType::List(Box::new(ValueType::Int)), &raw).unwrap(),
            raw
        );
        let bad = Value::List(vec![Value::Int(1), Value::String("x".into())]);
        assert!(adapt(&ValueType::List(Box::new(ValueType::Int)), &bad).is_err());
    }

    #[test]
    fn set_dedupes() {
        let raw = Value::List(vec![Value::Int(1), Value::Int(1), Value::Int(2)]);
        let Value::Set(items) = adapt(&ValueType::Set(Box::new(ValueType::Int)), &raw).unwrap() else {
            panic!("expected a set");
        };
        assert_eq!(items, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn union_tries_alternatives_in_order() {
        let string_first = ValueType::Union(vec![ValueType::String, ValueType::Path]);
        let path_first = ValueType::Union(vec![ValueType::Path, ValueType::String]);
        let raw = Value::String("out.txt".into());

        assert_eq!(adapt(&string_first, &raw).unwrap(), Value::String("out.txt".into()));
        assert_eq!(
            adapt(&path_first, &raw).unwrap(),
            Value::Path(PathBuf::from("out.txt"))
        );
    }
}
