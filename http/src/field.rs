//! The "not provided vs. explicit null" distinction request bodies need
//! (`spec.md` §4.4 body rules, §9 design note on the MISSING sentinel).
//!
//! The source ecosystem represents this with a singleton `MISSING` value
//! distinct from `None`, then strips any key whose value is `MISSING` before
//! serializing. Rust has no such ambient singleton, so each optional field
//! is instead typed as [`Nullable<T>`], the `Option<Option<T>>`-shaped sum
//! type `spec.md` §9 calls out as the natural target-language translation.

use serde::Serialize;
use serde_json::{Map, Value};

/// A JSON object field that may be omitted entirely, explicitly `null`, or
/// present with a value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Nullable<T> {
    /// The field was not provided; omit the key from the serialized body.
    #[default]
    Omitted,
    /// The field was explicitly set to `null`.
    Null,
    /// The field has a value.
    Value(T),
}

impl<T> Nullable<T> {
    /// Treat `Some` as present and `None` as omitted (never `Null`).
    #[must_use]
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Value(value),
            None => Self::Omitted,
        }
    }
}

impl<T: Serialize> Nullable<T> {
    /// Insert this field into `map` under `key`, following the three-state
    /// rule: omitted fields insert nothing, `Null` inserts `Value::Null`,
    /// and `Value` inserts the serialized value.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s [`Serialize`] implementation fails, which should be
    /// unreachable for the plain data types request bodies are built from.
    pub fn insert_into(self, map: &mut Map<String, Value>, key: &str) {
        match self {
            Self::Omitted => {}
            Self::Null => {
                map.insert(key.to_owned(), Value::Null);
            }
            Self::Value(value) => {
                map.insert(
                    key.to_owned(),
                    serde_json::to_value(value).expect("field value is serializable"),
                );
            }
        }
    }
}

impl<T> From<T> for Nullable<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::Nullable;
    use serde_json::{json, Map};

    #[test]
    fn omitted_inserts_nothing() {
        let mut map = Map::new();
        Nullable::<u64>::Omitted.insert_into(&mut map, "count");

        assert!(map.is_empty());
    }

    #[test]
    fn null_inserts_json_null() {
        let mut map = Map::new();
        Nullable::<u64>::Null.insert_into(&mut map, "count");

        assert_eq!(map.get("count"), Some(&json!(null)));
    }

    #[test]
    fn value_inserts_the_value() {
        let mut map = Map::new();
        Nullable::Value(5u64).insert_into(&mut map, "count");

        assert_eq!(map.get("count"), Some(&json!(5)));
    }
}
