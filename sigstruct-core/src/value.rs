//! Dynamic field values.
//!
//! Struct fields hold a [`Value`]: plain data (numbers, strings, arrays,
//! ordered objects), a nested [`Struct`], or an error captured from an async
//! source. Plain data compares structurally; structs and errors compare by
//! identity, so writing the same nested struct twice is a no-op while two
//! equal-looking structs are still different values.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::BoxError;
use crate::structure::Struct;

/// Ordered string-keyed map of plain values.
pub type Object = IndexMap<String, Value>;

#[derive(Clone, Default)]
pub enum Value {
    /// Absent. What a nullable getter yields when a dependency is missing.
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Object),
    Struct(Struct),
    /// A failure from an async source, stored as data.
    Error(Rc<dyn std::error::Error>),
}

impl Value {
    pub fn error(err: impl Into<BoxError>) -> Self {
        Self::Error(Rc::from(err.into()))
    }

    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Struct(_) => "struct",
            Self::Error(_) => "error",
        }
    }

    /// `Undefined` or `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::Array(_) | Self::Object(_) | Self::Struct(_) | Self::Error(_) => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integers, and floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Error(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Look up `key` in a plain object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Merge `patch` into `self`.
    ///
    /// Two objects merge key by key, recursively; anything else replaces.
    /// Structs and errors are leaves: they are never merged into.
    pub fn deep_merge(&mut self, patch: Value) {
        match (self, patch) {
            (Value::Object(target), Value::Object(patch)) => {
                for (key, value) in patch {
                    match target.get_mut(&key) {
                        Some(existing) => existing.deep_merge(value),
                        None => {
                            target.insert(key, value);
                        }
                    }
                }
            }
            (target, patch) => *target = patch,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => a.ptr_eq(b),
            (Self::Error(a), Self::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::Str(s) => write!(f, "Str({s:?})"),
            Self::Array(items) => f.debug_list().entries(items).finish(),
            Self::Object(map) => f.debug_map().entries(map).finish(),
            Self::Struct(s) => write!(f, "Struct({})", s.shape_name()),
            Self::Error(err) => write!(f, "Error({err})"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Undefined | Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Self::Struct(s) => {
                // Untracked, so serializing inside an effect adds no edges.
                let keys = s.keys();
                let mut map = serializer.serialize_map(Some(keys.len()))?;
                for key in &keys {
                    let value = s.get_untracked(key).unwrap_or_default();
                    map.serialize_entry(key, &value)?;
                }
                map.end()
            }
            Self::Error(err) => serializer.serialize_str(&err.to_string()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Self::Object(map)
    }
}

impl From<Struct> for Value {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Build a [`Value::Object`] from `key => value` pairs.
///
/// ```rust,ignore
/// let point = object! { "x" => 1, "y" => 2 };
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::Value::Object($crate::value::Object::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::value::Object::new();
        $( map.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        $crate::Value::Object(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_round_trip_keeps_order() {
        let value = Value::from(json!({ "b": 1, "a": [true, null, "x"], "c": 1.5 }));
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["b", "a", "c"]);
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({ "b": 1, "a": [true, null, "x"], "c": 1.5 })
        );
    }

    #[test]
    fn deep_merge_updates_only_given_leaves() {
        let mut target = object! {
            "name" => "a",
            "pos" => object! { "x" => 1, "y" => 2 },
        };
        target.deep_merge(object! { "pos" => object! { "y" => 5 } });

        assert_eq!(target.get("name"), Some(&Value::from("a")));
        assert_eq!(
            target.get("pos"),
            Some(&object! { "x" => 1, "y" => 5 })
        );
    }

    #[test]
    fn merge_replaces_non_objects() {
        let mut target = Value::from(vec![Value::from(1)]);
        target.deep_merge(object! { "x" => 1 });
        assert_eq!(target, object! { "x" => 1 });
    }

    #[test]
    fn errors_compare_by_identity() {
        let a = Value::error("boom");
        let b = Value::error("boom");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.as_error().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from(3).is_truthy());
        assert!(object! {}.is_truthy());
        assert!(Value::Null.is_nullish());
    }

    #[test]
    fn numbers_compare_across_variants() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_eq!(Value::Float(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float(4.5).as_i64(), None);
    }
}
