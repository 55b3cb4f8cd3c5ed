//! Typed operations, responses, and errors flowing through the pipeline.

use mcp_kafka_core::{
    DeliveryReceipt, ErrorKind, NewTopicSpec, ResourceClass, ToolKind, TopicInfo, ValidationError,
};

use crate::gateway::BrokerError;

/// Context carried with every operation through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub call_id: u64,
    pub tool: ToolKind,
    /// Selects the domain service the router hands the operation to.
    pub resource_class: ResourceClass,
    pub call_timeout_ms: u64,
}

impl OperationContext {
    #[must_use]
    pub fn new(
        call_id: u64,
        tool: ToolKind,
        resource_class: ResourceClass,
        call_timeout_ms: u64,
    ) -> Self {
        Self {
            call_id,
            tool,
            resource_class,
            call_timeout_ms,
        }
    }

    /// Label used for the routed service in logs.
    #[must_use]
    pub fn service_name(&self) -> &'static str {
        self.resource_class.service_name()
    }
}

/// A validated tool call, ready for routing.
#[derive(Debug, Clone)]
pub enum Operation {
    PublishMessage {
        ctx: OperationContext,
        topic: String,
        message: String,
        /// `None` when the client sent no key or an empty one.
        key: Option<String>,
    },
    ListTopics {
        ctx: OperationContext,
    },
    GetTopicInfo {
        ctx: OperationContext,
        topic: String,
    },
    DeleteTopic {
        ctx: OperationContext,
        topic: String,
    },
    CreateTopic {
        ctx: OperationContext,
        spec: NewTopicSpec,
    },
}

impl Operation {
    #[must_use]
    pub fn ctx(&self) -> &OperationContext {
        match self {
            Self::PublishMessage { ctx, .. }
            | Self::ListTopics { ctx }
            | Self::GetTopicInfo { ctx, .. }
            | Self::DeleteTopic { ctx, .. }
            | Self::CreateTopic { ctx, .. } => ctx,
        }
    }
}

/// Successful outcome of an operation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResponse {
    Published {
        topic: String,
        receipt: DeliveryReceipt,
    },
    /// Topic names, sorted ascending.
    Topics(Vec<String>),
    TopicInfo(TopicInfo),
    Deleted {
        topic: String,
    },
    Created {
        topic: String,
        num_partitions: i32,
        replication_factor: i16,
    },
    /// `create_topic` found the topic already present; nothing changed.
    AlreadyExists {
        topic: String,
    },
}

/// Errors returned by the pipeline or an operation handler.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("tool '{name}' is not registered")]
    UnknownOperation { name: String },
    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),
    #[error("no {} service registered", .class.service_name())]
    Unrouted { class: ResourceClass },
    #[error("wrong service for operation")]
    WrongService,
    #[error("could not connect to Kafka: {0}")]
    Connection(String),
    #[error("topic '{topic}' does not exist")]
    NotFound { topic: String },
    #[error("topic '{topic}' already exists")]
    AlreadyExists { topic: String },
    #[error("failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OperationError {
    /// Category reported in the result envelope.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Connection(_) => ErrorKind::Connection,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Publish { .. } => ErrorKind::Publish,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unrouted { .. } | Self::WrongService | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Admin-side mapping of broker failures.
impl From<BrokerError> for OperationError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Unreachable(reason) => Self::Connection(reason),
            BrokerError::UnknownTopic { topic } => Self::NotFound { topic },
            BrokerError::TopicExists { topic } => Self::AlreadyExists { topic },
            BrokerError::TimedOut { timeout_ms } => Self::Timeout { timeout_ms },
            other @ (BrokerError::Rejected(_) | BrokerError::Other(_)) => {
                Self::Internal(anyhow::Error::new(other))
            }
        }
    }
}

/// Errors from classifying a tool call into an `Operation`.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("tool '{name}' is not registered")]
    UnknownOperation { name: String },
    #[error(transparent)]
    InvalidArgument(#[from] ValidationError),
}

impl From<ClassifyError> for OperationError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::UnknownOperation { name } => Self::UnknownOperation { name },
            ClassifyError::InvalidArgument(e) => Self::InvalidArgument(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use mcp_kafka_core::ValidationReason;

    use super::*;

    #[test]
    fn broker_errors_map_to_taxonomy() {
        let cases = [
            (BrokerError::Unreachable("down".into()), ErrorKind::Connection),
            (BrokerError::UnknownTopic { topic: "t".into() }, ErrorKind::NotFound),
            (BrokerError::TopicExists { topic: "t".into() }, ErrorKind::AlreadyExists),
            (BrokerError::TimedOut { timeout_ms: 30_000 }, ErrorKind::Timeout),
            (BrokerError::Rejected("policy".into()), ErrorKind::Internal),
            (BrokerError::Other("boom".into()), ErrorKind::Internal),
        ];
        for (broker, kind) in cases {
            assert_eq!(OperationError::from(broker).kind(), kind);
        }
    }

    #[test]
    fn classify_errors_keep_their_kind() {
        let unknown: OperationError = ClassifyError::UnknownOperation { name: "x".into() }.into();
        assert_eq!(unknown.kind(), ErrorKind::UnknownOperation);

        let invalid: OperationError =
            ClassifyError::from(ValidationError::new("topic", ValidationReason::Missing)).into();
        assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
        assert_eq!(invalid.to_string(), "invalid argument 'topic': required field is missing");
    }

    #[test]
    fn routing_faults_are_internal() {
        assert_eq!(OperationError::WrongService.kind(), ErrorKind::Internal);
        assert_eq!(
            OperationError::Unrouted {
                class: ResourceClass::Producer
            }
            .kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            OperationError::Unrouted {
                class: ResourceClass::Admin
            }
            .to_string(),
            "no admin service registered"
        );
    }

    #[test]
    fn internal_errors_show_only_the_cause() {
        let err = OperationError::from(BrokerError::Rejected("policy violation".into()));
        assert_eq!(err.to_string(), "broker rejected the request: policy violation");
    }
}
