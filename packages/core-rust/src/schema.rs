//! Declarative operation schemas and generic argument validation.
//!
//! Every tool is described by an [`OperationSpec`]: a name, a description,
//! the broker resource class it needs, and an ordered list of
//! [`ParameterSpec`]s. Validation is driven entirely by this data, so no
//! handler ever inspects raw JSON.

use serde_json::{json, Value};

use crate::types::{ArgValue, ArgumentBag, ValidatedArgs};

/// Longest topic name the broker accepts.
pub const MAX_TOPIC_NAME_LEN: usize = 249;

// ---------------------------------------------------------------------------
// Resource class
// ---------------------------------------------------------------------------

/// Which kind of broker connection an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// A producer connection (message publishing).
    Producer,
    /// An admin connection (topic metadata and management).
    Admin,
}

impl ResourceClass {
    /// Service name the operation router registers this class under.
    #[must_use]
    pub fn service_name(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Admin => "admin",
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Structural type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    OptionalString,
    OptionalInteger,
    /// Object whose values are all strings. Always optional; absent means empty.
    StringMap,
}

impl ParameterKind {
    /// Whether the client must supply this parameter.
    #[must_use]
    pub fn is_required(self) -> bool {
        matches!(self, Self::String | Self::Integer)
    }

    fn expected(self) -> &'static str {
        match self {
            Self::String | Self::OptionalString => "string",
            Self::Integer | Self::OptionalInteger => "integer",
            Self::StringMap => "object",
        }
    }
}

/// Value-level constraint attached to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// String must contain at least one character.
    NonEmpty,
    /// Integer must be at least this value.
    Min(i64),
    /// Integer must be at most this value.
    Max(i64),
    /// String must be a legal Kafka topic name.
    TopicName,
}

/// Declaration of one named parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParameterKind,
    pub constraints: Vec<Constraint>,
    /// Value used when an optional parameter is omitted.
    pub default: Option<ArgValue>,
}

impl ParameterSpec {
    /// Creates a parameter with no constraints and no default.
    #[must_use]
    pub fn new(name: &'static str, kind: ParameterKind, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            constraints: Vec::new(),
            default: None,
        }
    }

    /// Adds a constraint.
    #[must_use]
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Sets the default used when the parameter is omitted.
    #[must_use]
    pub fn with_default(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Renders this parameter as a JSON Schema property.
    #[must_use]
    pub fn json_schema(&self) -> Value {
        let mut schema = serde_json::Map::new();
        match self.kind {
            ParameterKind::String | ParameterKind::OptionalString => {
                schema.insert("type".into(), json!("string"));
            }
            ParameterKind::Integer | ParameterKind::OptionalInteger => {
                schema.insert("type".into(), json!("integer"));
            }
            ParameterKind::StringMap => {
                schema.insert("type".into(), json!("object"));
                schema.insert("additionalProperties".into(), json!({ "type": "string" }));
            }
        }
        schema.insert("description".into(), json!(self.description));
        for constraint in &self.constraints {
            match *constraint {
                Constraint::NonEmpty => {
                    schema.insert("minLength".into(), json!(1));
                }
                Constraint::Min(min) => {
                    schema.insert("minimum".into(), json!(min));
                }
                Constraint::Max(max) => {
                    schema.insert("maximum".into(), json!(max));
                }
                Constraint::TopicName => {
                    schema.insert("pattern".into(), json!("^[A-Za-z0-9._-]+$"));
                    schema.insert("maxLength".into(), json!(MAX_TOPIC_NAME_LEN));
                }
            }
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.to_json());
        }
        Value::Object(schema)
    }

    fn validate(&self, raw: &Value) -> Result<ArgValue, ValidationError> {
        match (self.kind, raw) {
            (ParameterKind::String | ParameterKind::OptionalString, Value::String(s)) => {
                self.check_string(s)?;
                Ok(ArgValue::String(s.clone()))
            }
            (ParameterKind::Integer | ParameterKind::OptionalInteger, Value::Number(n)) => {
                if let Some(value) = n.as_i64() {
                    self.check_int(value)?;
                    Ok(ArgValue::Int(value))
                } else if n.is_u64() {
                    Err(self.error(ValidationReason::IntegerOverflow))
                } else {
                    Err(self.error(ValidationReason::WrongType {
                        expected: "integer",
                        found: "number",
                    }))
                }
            }
            (ParameterKind::StringMap, Value::Object(entries)) => {
                let mut map = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    let Value::String(s) = value else {
                        return Err(self.error(ValidationReason::NonStringMapValue {
                            key: key.clone(),
                        }));
                    };
                    map.insert(key.clone(), s.clone());
                }
                Ok(ArgValue::StringMap(map))
            }
            (kind, other) => Err(self.error(ValidationReason::WrongType {
                expected: kind.expected(),
                found: json_type_name(other),
            })),
        }
    }

    fn check_string(&self, value: &str) -> Result<(), ValidationError> {
        for constraint in &self.constraints {
            match constraint {
                Constraint::NonEmpty if value.is_empty() => {
                    return Err(self.error(ValidationReason::Empty));
                }
                Constraint::TopicName if !is_legal_topic_name(value) => {
                    return Err(self.error(ValidationReason::IllegalTopicName {
                        value: value.to_string(),
                    }));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_int(&self, value: i64) -> Result<(), ValidationError> {
        for constraint in &self.constraints {
            match *constraint {
                Constraint::Min(min) if value < min => {
                    return Err(self.error(ValidationReason::BelowMinimum { min, value }));
                }
                Constraint::Max(max) if value > max => {
                    return Err(self.error(ValidationReason::AboveMaximum { max, value }));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn error(&self, reason: ValidationReason) -> ValidationError {
        ValidationError::new(self.name, reason)
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Declaration of one remotely invokable operation (a "tool").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpec {
    /// Unique name clients call the operation by.
    pub name: &'static str,
    pub description: &'static str,
    pub resource_class: ResourceClass,
    /// Parameters in declaration order.
    pub parameters: Vec<ParameterSpec>,
}

impl OperationSpec {
    /// Looks up a parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validates a raw argument bag against this operation's parameters.
    ///
    /// Parameters are checked in declaration order and the first violation
    /// wins. `null` is treated the same as an absent field. Fields that are
    /// not declared are ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` naming the offending field when a required
    /// field is missing, a value has the wrong type, or a constraint fails.
    pub fn validate(&self, args: &ArgumentBag) -> Result<ValidatedArgs, ValidationError> {
        let mut validated = ValidatedArgs::new();
        for param in &self.parameters {
            match args.get(param.name).filter(|v| !v.is_null()) {
                Some(raw) => validated.insert(param.name, param.validate(raw)?),
                None if param.kind.is_required() => {
                    return Err(param.error(ValidationReason::Missing));
                }
                None => {
                    if let Some(default) = &param.default {
                        validated.insert(param.name, default.clone());
                    }
                }
            }
        }
        Ok(validated)
    }

    /// Renders the JSON Schema object advertised to clients at discovery.
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.parameters {
            properties.insert(param.name.to_string(), param.json_schema());
            if param.kind.is_required() {
                required.push(json!(param.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A schema violation, naming the field that caused it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid argument '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: ValidationReason,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, reason: ValidationReason) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationReason {
    #[error("required field is missing")]
    Missing,
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    #[error("must not be empty")]
    Empty,
    #[error("must be at least {min}, got {value}")]
    BelowMinimum { min: i64, value: i64 },
    #[error("must be at most {max}, got {value}")]
    AboveMaximum { max: i64, value: i64 },
    #[error("integer is out of range")]
    IntegerOverflow,
    #[error("'{value}' is not a legal topic name (1-249 characters from [A-Za-z0-9._-], not '.' or '..')")]
    IllegalTopicName { value: String },
    #[error("value for key '{key}' must be a string")]
    NonStringMapValue { key: String },
    #[error("arguments must be a JSON object")]
    NotAnObject,
}

/// Whether `name` is accepted by the broker as a topic name.
#[must_use]
pub fn is_legal_topic_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOPIC_NAME_LEN
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn bag(value: Value) -> ArgumentBag {
        match value {
            Value::Object(map) => map,
            _ => panic!("test bag must be an object"),
        }
    }

    fn sample_spec() -> OperationSpec {
        OperationSpec {
            name: "sample",
            description: "Sample operation.",
            resource_class: ResourceClass::Admin,
            parameters: vec![
                ParameterSpec::new("topic", ParameterKind::String, "Topic.")
                    .with(Constraint::NonEmpty)
                    .with(Constraint::TopicName),
                ParameterSpec::new("count", ParameterKind::OptionalInteger, "Count.")
                    .with(Constraint::Min(1))
                    .with(Constraint::Max(100))
                    .with_default(ArgValue::Int(1)),
                ParameterSpec::new("label", ParameterKind::OptionalString, "Label."),
                ParameterSpec::new("config", ParameterKind::StringMap, "Config."),
            ],
        }
    }

    #[test]
    fn valid_arguments_pass_and_defaults_apply() {
        let args = sample_spec()
            .validate(&bag(json!({ "topic": "orders" })))
            .unwrap();
        assert_eq!(args.string("topic"), Some("orders"));
        assert_eq!(args.int("count"), Some(1));
        assert!(!args.contains("label"));
        assert!(!args.contains("config"));
    }

    #[test]
    fn missing_required_field_is_named() {
        let err = sample_spec().validate(&bag(json!({}))).unwrap_err();
        assert_eq!(err.field, "topic");
        assert_eq!(err.reason, ValidationReason::Missing);
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": null })))
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::Missing);
    }

    #[test]
    fn empty_string_rejected_before_topic_name_check() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": "" })))
            .unwrap_err();
        assert_eq!(err.field, "topic");
        assert_eq!(err.reason, ValidationReason::Empty);
    }

    #[test]
    fn illegal_topic_name_rejected() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": "bad topic!" })))
            .unwrap_err();
        assert!(matches!(err.reason, ValidationReason::IllegalTopicName { .. }));
    }

    #[test]
    fn integer_bounds_enforced() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": "t", "count": 0 })))
            .unwrap_err();
        assert_eq!(err.field, "count");
        assert_eq!(err.reason, ValidationReason::BelowMinimum { min: 1, value: 0 });

        let err = sample_spec()
            .validate(&bag(json!({ "topic": "t", "count": 101 })))
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::AboveMaximum { max: 100, value: 101 });
    }

    #[test]
    fn integers_are_not_coerced() {
        for raw in [json!("3"), json!(2.5), json!(true)] {
            let err = sample_spec()
                .validate(&bag(json!({ "topic": "t", "count": raw })))
                .unwrap_err();
            assert_eq!(err.field, "count");
            assert!(matches!(err.reason, ValidationReason::WrongType { expected: "integer", .. }));
        }
    }

    #[test]
    fn huge_unsigned_integer_overflows() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": "t", "count": u64::MAX })))
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::IntegerOverflow);
    }

    #[test]
    fn string_map_requires_string_values() {
        let err = sample_spec()
            .validate(&bag(json!({ "topic": "t", "config": { "retention.ms": 1000 } })))
            .unwrap_err();
        assert_eq!(err.field, "config");
        assert_eq!(
            err.reason,
            ValidationReason::NonStringMapValue { key: "retention.ms".to_string() }
        );

        let args = sample_spec()
            .validate(&bag(json!({ "topic": "t", "config": { "retention.ms": "1000" } })))
            .unwrap();
        assert_eq!(args.string_map("config").unwrap()["retention.ms"], "1000");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let args = sample_spec()
            .validate(&bag(json!({ "topic": "t", "extra": [1, 2, 3] })))
            .unwrap();
        assert!(!args.contains("extra"));
    }

    #[test]
    fn input_schema_lists_required_and_constraints() {
        let schema = sample_spec().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["topic"]));
        assert_eq!(schema["properties"]["topic"]["minLength"], 1);
        assert_eq!(schema["properties"]["count"]["minimum"], 1);
        assert_eq!(schema["properties"]["count"]["maximum"], 100);
        assert_eq!(schema["properties"]["count"]["default"], 1);
        assert_eq!(schema["properties"]["label"]["type"], "string");
        assert_eq!(
            schema["properties"]["config"]["additionalProperties"]["type"],
            "string"
        );
    }

    #[test]
    fn topic_name_edge_cases() {
        assert!(is_legal_topic_name("orders.v1_a-b"));
        assert!(!is_legal_topic_name("."));
        assert!(!is_legal_topic_name(".."));
        assert!(!is_legal_topic_name(""));
        assert!(!is_legal_topic_name(&"a".repeat(MAX_TOPIC_NAME_LEN + 1)));
        assert!(is_legal_topic_name(&"a".repeat(MAX_TOPIC_NAME_LEN)));
    }

    #[test]
    fn resource_class_service_names() {
        assert_eq!(ResourceClass::Producer.service_name(), "producer");
        assert_eq!(ResourceClass::Admin.service_name(), "admin");
    }

    proptest! {
        #[test]
        fn any_count_below_one_is_rejected(count in i64::MIN..1) {
            let err = sample_spec()
                .validate(&bag(json!({ "topic": "t", "count": count })))
                .unwrap_err();
            prop_assert_eq!(err.field, "count");
        }

        #[test]
        fn any_count_in_range_is_accepted(count in 1i64..=100) {
            let args = sample_spec()
                .validate(&bag(json!({ "topic": "t", "count": count })))
                .unwrap();
            prop_assert_eq!(args.int("count"), Some(count));
        }

        #[test]
        fn legal_topic_names_validate(name in "[A-Za-z0-9_-][A-Za-z0-9._-]{0,60}") {
            let args = sample_spec()
                .validate(&bag(json!({ "topic": name.clone() })))
                .unwrap();
            prop_assert_eq!(args.string("topic"), Some(name.as_str()));
        }
    }
}
