// crates/waterline-core/src/core/context.rs
// ============================================================================
// Module: Waterline Cumulative Context
// Description: Tagged map of typed values accumulated across a pipeline run.
// Purpose: Replace untyped JSON blobs with a typed context and explicit merges.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The cumulative context is the growing map of merged step outputs carried
//! through a pipeline run. Values are a tagged sum of primitives, lists, and
//! nested maps with typed accessor helpers, so key drift and silent null
//! propagation surface as `None` at the access site instead of corrupting
//! downstream steps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Context Values
// ============================================================================

/// Tagged value stored in a cumulative context map.
///
/// # Invariants
/// - Serializes as plain JSON (untagged); integers round-trip as `i64` when
///   representable and fall back to `f64` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    /// Explicit null. Present so adapter outputs can carry "no value".
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Ordered list of values.
    List(Vec<ContextValue>),
    /// Nested map of values.
    Map(ContextMap),
}

impl ContextValue {
    /// Returns true when the value is the explicit null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content when the value is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the boolean content when the value is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer content when the value is an integer.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the numeric content as `f64` for integers and floats.
    ///
    /// Booleans are deliberately not numeric.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the list content when the value is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[ContextValue]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns the nested map when the value is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&ContextMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts a JSON value into a context value.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => number.as_i64().map_or_else(
                || Self::Float(number.as_f64().unwrap_or_default()),
                Self::Integer,
            ),
            Value::String(text) => Self::Text(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(entries) => {
                let mut map = ContextMap::new();
                for (key, entry) in entries {
                    map.insert(key, Self::from_json(entry));
                }
                Self::Map(map)
            }
        }
    }

    /// Converts the context value into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Integer(value) => Value::from(*value),
            Self::Float(value) => {
                serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number)
            }
            Self::Text(text) => Value::String(text.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => map.to_json(),
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ContextValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ContextValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ContextValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// SECTION: Context Map
// ============================================================================

/// Ordered map of context values keyed by canonical field name.
///
/// # Invariants
/// - Keys iterate in lexicographic order for deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextMap(BTreeMap<String, ContextValue>);

impl ContextMap {
    /// Creates an empty context map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns true when the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Inserts a value under the given key, returning any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) -> Option<ContextValue> {
        self.0.insert(key.into(), value)
    }

    /// Removes the value under the given key.
    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.0.remove(key)
    }

    /// Returns the value under the given key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key)
    }

    /// Returns the value under the given key, treating explicit null as absent.
    #[must_use]
    pub fn get_non_null(&self, key: &str) -> Option<&ContextValue> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    /// Returns true when the key is present (including explicit null).
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns the text value under the given key.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ContextValue::as_text)
    }

    /// Returns the integer value under the given key.
    #[must_use]
    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(ContextValue::as_integer)
    }

    /// Returns the numeric value under the given key as `f64`.
    #[must_use]
    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(ContextValue::as_number)
    }

    /// Returns the boolean value under the given key.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(ContextValue::as_bool)
    }

    /// Returns the list value under the given key.
    #[must_use]
    pub fn get_list(&self, key: &str) -> Option<&[ContextValue]> {
        self.get(key).and_then(ContextValue::as_list)
    }

    /// Returns the nested map under the given key.
    #[must_use]
    pub fn get_map(&self, key: &str) -> Option<&ContextMap> {
        self.get(key).and_then(ContextValue::as_map)
    }

    /// Iterates the entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, ContextValue> {
        self.0.iter()
    }

    /// Iterates the keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, ContextValue> {
        self.0.keys()
    }

    /// Deep-merges `incoming` into this map with last-writer-wins semantics.
    ///
    /// Nested maps merge recursively; every other value kind is overwritten.
    /// Incoming explicit nulls are skipped, so a later step can never erase a
    /// value an earlier step discovered.
    pub fn merge_deep(&mut self, incoming: &Self) {
        for (key, value) in &incoming.0 {
            if value.is_null() {
                continue;
            }
            match (self.0.get_mut(key), value) {
                (Some(ContextValue::Map(existing)), ContextValue::Map(update)) => {
                    existing.merge_deep(update);
                }
                _ => {
                    self.0.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Shallow additive merge: overwrites only keys whose incoming value is non-null.
    pub fn merge_non_null(&mut self, incoming: &Self) {
        for (key, value) in &incoming.0 {
            if value.is_null() {
                continue;
            }
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns a copy restricted to the given keys (explicit nulls excluded).
    #[must_use]
    pub fn restricted_to(&self, keys: &[String]) -> Self {
        let mut restricted = Self::new();
        for key in keys {
            if let Some(value) = self.get_non_null(key) {
                restricted.insert(key.clone(), value.clone());
            }
        }
        restricted
    }

    /// Converts a JSON object into a context map (non-objects yield an empty map).
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match ContextValue::from_json(value) {
            ContextValue::Map(map) => map,
            _ => Self::new(),
        }
    }

    /// Converts the context map into a JSON object value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut entries = serde_json::Map::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            entries.insert(key.clone(), value.to_json());
        }
        Value::Object(entries)
    }
}

impl FromIterator<(String, ContextValue)> for ContextMap {
    fn from_iter<I: IntoIterator<Item = (String, ContextValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ContextMap {
    type Item = (&'a String, &'a ContextValue);
    type IntoIter = btree_map::Iter<'a, String, ContextValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
