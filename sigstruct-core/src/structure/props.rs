//! Construction overrides.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::value::{Object, Value};

use super::field::Field;

/// One override.
#[derive(Clone, Debug)]
pub enum Prop {
    /// Written through the field after declaration. Objects deep-merge.
    Value(Value),
    /// Installed as the field's backing store, shared with the caller.
    Bind(Field),
}

/// Overrides passed to [`Runtime::structure`](crate::Runtime::structure).
#[derive(Clone, Debug, Default)]
pub struct Props {
    entries: IndexMap<String, Prop>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `key` with a plain value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), Prop::Value(value.into()));
        self
    }

    /// Back `key` with an existing cell or derivation.
    pub fn bind(mut self, key: impl Into<String>, field: impl Into<Field>) -> Self {
        self.entries.insert(key.into(), Prop::Bind(field.into()));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, prop: Prop) {
        self.entries.insert(key.into(), prop);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.entries.get(key)
    }

    pub(crate) fn take_bind(&mut self, key: &str) -> Option<Field> {
        match self.entries.get(key) {
            Some(Prop::Bind(_)) => match self.entries.shift_remove(key) {
                Some(Prop::Bind(field)) => Some(field),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Prop)> {
        self.entries.into_iter()
    }
}

impl From<Object> for Props {
    fn from(object: Object) -> Self {
        Self {
            entries: object
                .into_iter()
                .map(|(key, value)| (key, Prop::Value(value)))
                .collect(),
        }
    }
}

impl TryFrom<Value> for Props {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(object.into()),
            Value::Undefined | Value::Null => Ok(Self::new()),
            other => Err(Error::InvalidInput(other.type_name())),
        }
    }
}

impl TryFrom<serde_json::Value> for Props {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Value::from(json).try_into()
    }
}

impl<K: Into<String>> FromIterator<(K, Prop)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, Prop)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(key, prop)| (key.into(), prop)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn props_from_json_object() {
        let props = Props::try_from(json!({ "a": 1, "b": { "c": true } })).unwrap();
        assert_eq!(props.len(), 2);
        assert!(matches!(props.get("a"), Some(Prop::Value(Value::Int(1)))));
    }

    #[test]
    fn props_reject_scalars() {
        assert_eq!(
            Props::try_from(json!(3)).unwrap_err(),
            Error::InvalidInput("int")
        );
        assert!(Props::try_from(json!(null)).unwrap().is_empty());
    }
}
