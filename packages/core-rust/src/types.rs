use std::collections::BTreeMap;

use serde_json::Value;

/// Raw, dynamically-typed arguments supplied with a tool call.
///
/// Keys are parameter names; values are whatever JSON the client sent.
/// Nothing in the bag is trusted until it has been validated against an
/// `OperationSpec`.
pub type ArgumentBag = serde_json::Map<String, Value>;

/// Typed argument value produced by schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// UTF-8 string.
    String(String),
    /// Signed integer, already range-checked against the parameter constraints.
    Int(i64),
    /// String-to-string map. `BTreeMap` keeps iteration deterministic.
    StringMap(BTreeMap<String, String>),
}

impl ArgValue {
    /// Converts the value back into JSON (used when rendering schema defaults).
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Int(n) => Value::from(*n),
            Self::StringMap(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }
}

/// Arguments that passed validation against an `OperationSpec`.
///
/// Only parameters that were supplied (or that carry a default) are present.
/// Optional parameters the client omitted are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedArgs {
    values: BTreeMap<&'static str, ArgValue>,
}

impl ValidatedArgs {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a validated value for the named parameter.
    pub fn insert(&mut self, name: &'static str, value: ArgValue) {
        self.values.insert(name, value);
    }

    /// Returns the string value of `name`, if present and a string.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the integer value of `name`, if present and an integer.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Returns the map value of `name`, if present and a string map.
    #[must_use]
    pub fn string_map(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        match self.values.get(name) {
            Some(ArgValue::StringMap(map)) => Some(map),
            _ => None,
        }
    }

    /// Whether a value was recorded for `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Names of all recorded parameters, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }
}
