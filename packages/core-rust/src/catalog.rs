//! The fixed tool catalog and the schema registry built from it.

use std::collections::HashMap;

use crate::schema::{Constraint, OperationSpec, ParameterKind, ParameterSpec, ResourceClass};
use crate::types::ArgValue;

/// Largest partition count the broker protocol can express.
pub const MAX_PARTITIONS: i64 = 2_147_483_647;
/// Largest replication factor the broker protocol can express.
pub const MAX_REPLICATION_FACTOR: i64 = 32_767;

// ---------------------------------------------------------------------------
// ToolKind
// ---------------------------------------------------------------------------

/// The five operations this server knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    PublishMessage,
    ListTopics,
    GetTopicInfo,
    DeleteTopic,
    CreateTopic,
}

impl ToolKind {
    /// All tools in catalog order.
    pub const ALL: [ToolKind; 5] = [
        Self::PublishMessage,
        Self::ListTopics,
        Self::GetTopicInfo,
        Self::DeleteTopic,
        Self::CreateTopic,
    ];

    /// Wire name of the tool.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PublishMessage => "publish_message",
            Self::ListTopics => "list_topics",
            Self::GetTopicInfo => "get_topic_info",
            Self::DeleteTopic => "delete_topic",
            Self::CreateTopic => "create_topic",
        }
    }

    /// Resolves a wire name back to a tool.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Whether the operation waits on a bounded broker acknowledgement.
    #[must_use]
    pub fn awaits_ack(self) -> bool {
        matches!(self, Self::PublishMessage | Self::DeleteTopic | Self::CreateTopic)
    }

    /// Builds the declarative spec for this tool.
    #[must_use]
    pub fn spec(self) -> OperationSpec {
        match self {
            Self::PublishMessage => OperationSpec {
                name: self.name(),
                description: "Publish a message to a Kafka topic. The call returns once \
                              the broker has acknowledged the write.",
                resource_class: ResourceClass::Producer,
                parameters: vec![
                    topic_param("Name of the topic to publish to."),
                    ParameterSpec::new(
                        "message",
                        ParameterKind::String,
                        "Message payload, sent as UTF-8 bytes.",
                    ),
                    ParameterSpec::new(
                        "key",
                        ParameterKind::OptionalString,
                        "Optional message key, sent as UTF-8 bytes. An empty key means no key.",
                    ),
                ],
            },
            Self::ListTopics => OperationSpec {
                name: self.name(),
                description: "List the names of all topics in the Kafka cluster.",
                resource_class: ResourceClass::Admin,
                parameters: Vec::new(),
            },
            Self::GetTopicInfo => OperationSpec {
                name: self.name(),
                description: "Describe a topic: its partitions with leader, replicas and \
                              in-sync replicas, and its configuration.",
                resource_class: ResourceClass::Admin,
                parameters: vec![topic_param("Name of the topic to describe.")],
            },
            Self::DeleteTopic => OperationSpec {
                name: self.name(),
                description: "Delete a topic. Waits up to 30 seconds for the broker to \
                              acknowledge the request; deletion itself may complete later.",
                resource_class: ResourceClass::Admin,
                parameters: vec![topic_param("Name of the topic to delete.")],
            },
            Self::CreateTopic => OperationSpec {
                name: self.name(),
                description: "Create a topic. Creating a topic that already exists succeeds \
                              with a note and changes nothing.",
                resource_class: ResourceClass::Admin,
                parameters: vec![
                    topic_param("Name of the topic to create."),
                    ParameterSpec::new(
                        "num_partitions",
                        ParameterKind::OptionalInteger,
                        "Number of partitions.",
                    )
                    .with(Constraint::Min(1))
                    .with(Constraint::Max(MAX_PARTITIONS))
                    .with_default(ArgValue::Int(1)),
                    ParameterSpec::new(
                        "replication_factor",
                        ParameterKind::OptionalInteger,
                        "Replication factor for each partition.",
                    )
                    .with(Constraint::Min(1))
                    .with(Constraint::Max(MAX_REPLICATION_FACTOR))
                    .with_default(ArgValue::Int(1)),
                    ParameterSpec::new(
                        "config",
                        ParameterKind::StringMap,
                        "Topic configuration overrides, e.g. {\"retention.ms\": \"86400000\"}.",
                    ),
                ],
            },
        }
    }
}

fn topic_param(description: &'static str) -> ParameterSpec {
    ParameterSpec::new("topic", ParameterKind::String, description)
        .with(Constraint::NonEmpty)
        .with(Constraint::TopicName)
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

/// Error building a [`ToolRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("operation '{0}' is registered more than once")]
    DuplicateOperation(String),
    #[error("operation '{0}' has no handler")]
    UnknownOperation(String),
    #[error("operation '{name}' must use the {expected:?} resource class, not {found:?}")]
    ResourceClassMismatch {
        name: String,
        expected: ResourceClass,
        found: ResourceClass,
    },
}

/// Immutable lookup table of operation specs.
///
/// Built once at startup. Both discovery and dispatch read from the same
/// instance, so the set of announced operations always equals the set of
/// accepted ones.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<OperationSpec>,
    index: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    /// Builds a registry from an ordered list of specs.
    ///
    /// Only operations with a [`ToolKind`] can be executed, and they run on
    /// the resource class that kind declares. Anything else would be
    /// announced but never accepted, so it is refused here.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateOperation` if two specs share a name
    /// - `RegistryError::UnknownOperation` if a name has no `ToolKind`
    /// - `RegistryError::ResourceClassMismatch` if a spec overrides its kind's class
    pub fn new(specs: Vec<OperationSpec>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(specs.len());
        for (i, spec) in specs.iter().enumerate() {
            let kind = ToolKind::from_name(spec.name)
                .ok_or_else(|| RegistryError::UnknownOperation(spec.name.to_string()))?;
            let expected = kind.spec().resource_class;
            if spec.resource_class != expected {
                return Err(RegistryError::ResourceClassMismatch {
                    name: spec.name.to_string(),
                    expected,
                    found: spec.resource_class,
                });
            }
            if index.insert(spec.name, i).is_some() {
                return Err(RegistryError::DuplicateOperation(spec.name.to_string()));
            }
        }
        Ok(Self { specs, index })
    }

    /// Registry holding the full five-tool catalog.
    #[must_use]
    pub fn standard() -> Self {
        let specs: Vec<_> = ToolKind::ALL.into_iter().map(ToolKind::spec).collect();
        let index = specs.iter().enumerate().map(|(i, s)| (s.name, i)).collect();
        Self { specs, index }
    }

    /// All specs in registration order.
    #[must_use]
    pub fn list_operations(&self) -> &[OperationSpec] {
        &self.specs
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&OperationSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::ValidationReason;
    use crate::types::ArgumentBag;

    fn bag(value: serde_json::Value) -> ArgumentBag {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn standard_registry_has_five_tools_in_order() {
        let registry = ToolRegistry::standard();
        let names: Vec<_> = registry.list_operations().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["publish_message", "list_topics", "get_topic_info", "delete_topic", "create_topic"]
        );
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn lookup_finds_known_and_rejects_unknown() {
        let registry = ToolRegistry::standard();
        assert_eq!(registry.lookup("delete_topic").unwrap().name, "delete_topic");
        assert!(registry.lookup("consume_messages").is_none());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = ToolRegistry::new(vec![ToolKind::ListTopics.spec(), ToolKind::ListTopics.spec()])
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateOperation("list_topics".to_string()));
    }

    #[test]
    fn specs_without_a_handler_rejected() {
        let custom = OperationSpec {
            name: "describe_cluster",
            ..ToolKind::ListTopics.spec()
        };
        let err = ToolRegistry::new(vec![custom]).unwrap_err();
        assert_eq!(err, RegistryError::UnknownOperation("describe_cluster".to_string()));
    }

    #[test]
    fn overridden_resource_class_rejected() {
        let misrouted = OperationSpec {
            resource_class: ResourceClass::Producer,
            ..ToolKind::ListTopics.spec()
        };
        let err = ToolRegistry::new(vec![misrouted]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ResourceClassMismatch {
                name: "list_topics".to_string(),
                expected: ResourceClass::Admin,
                found: ResourceClass::Producer,
            }
        );
    }

    #[test]
    fn tool_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.spec().name, kind.name());
        }
        assert_eq!(ToolKind::from_name("nope"), None);
    }

    #[test]
    fn resource_classes_match_table() {
        assert_eq!(ToolKind::PublishMessage.spec().resource_class, ResourceClass::Producer);
        for kind in [
            ToolKind::ListTopics,
            ToolKind::GetTopicInfo,
            ToolKind::DeleteTopic,
            ToolKind::CreateTopic,
        ] {
            assert_eq!(kind.spec().resource_class, ResourceClass::Admin);
        }
    }

    #[test]
    fn create_topic_defaults_and_bounds() {
        let spec = ToolKind::CreateTopic.spec();
        let args = spec.validate(&bag(json!({ "topic": "orders" }))).unwrap();
        assert_eq!(args.int("num_partitions"), Some(1));
        assert_eq!(args.int("replication_factor"), Some(1));

        let err = spec
            .validate(&bag(json!({ "topic": "orders", "num_partitions": 0 })))
            .unwrap_err();
        assert_eq!(err.field, "num_partitions");

        let err = spec
            .validate(&bag(json!({ "topic": "orders", "replication_factor": 40_000 })))
            .unwrap_err();
        assert_eq!(err.field, "replication_factor");
        assert!(matches!(err.reason, ValidationReason::AboveMaximum { .. }));
    }

    #[test]
    fn publish_message_allows_empty_payload() {
        let spec = ToolKind::PublishMessage.spec();
        let args = spec
            .validate(&bag(json!({ "topic": "orders", "message": "" })))
            .unwrap();
        assert_eq!(args.string("message"), Some(""));

        let err = spec.validate(&bag(json!({ "topic": "orders" }))).unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn list_topics_schema_is_empty_object() {
        let schema = ToolKind::ListTopics.spec().input_schema();
        assert_eq!(schema, json!({ "type": "object", "properties": {}, "required": [] }));
        assert!(ToolKind::ListTopics.spec().validate(&ArgumentBag::new()).is_ok());
    }

    #[test]
    fn only_writes_await_ack() {
        assert!(ToolKind::PublishMessage.awaits_ack());
        assert!(ToolKind::DeleteTopic.awaits_ack());
        assert!(ToolKind::CreateTopic.awaits_ack());
        assert!(!ToolKind::ListTopics.awaits_ack());
        assert!(!ToolKind::GetTopicInfo.awaits_ack());
    }
}
