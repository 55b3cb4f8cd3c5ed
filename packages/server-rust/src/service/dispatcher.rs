//! Dispatcher and Capability Announcer.
//!
//! The [`Dispatcher`] is the single boundary between the transport and the
//! operation pipeline: every call it accepts comes back as a
//! [`ResultEnvelope`], never as an error. Discovery reads the same registry
//! the classifier validates against, so the announced and accepted tool sets
//! cannot diverge.

use std::sync::Arc;

use mcp_kafka_core::messages::ToolDefinition;
use mcp_kafka_core::{
    ArgumentBag, OperationSpec, ResourceClass, ResultEnvelope, ToolRegistry, ValidationError,
    ValidationReason,
};
use serde_json::Value;
use tower::{Service, ServiceExt};
use tracing::{debug, warn};

use super::classify::OperationService;
use super::config::ServerConfig;
use super::domain::{AdminService, ProducerService};
use super::middleware::{build_operation_pipeline, OperationPipeline};
use super::operation::{OperationError, OperationResponse};
use super::router::OperationRouter;
use crate::gateway::BrokerGateway;

/// Note attached when `create_topic` finds the topic already present.
pub const ALREADY_EXISTS_NOTE: &str = "topic already exists";

/// Executes tool calls one at a time and wraps every outcome in an envelope.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    classifier: OperationService,
    pipeline: OperationPipeline,
}

impl Dispatcher {
    /// Wires the classifier, router, domain services and middleware together.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gateway: BrokerGateway, config: Arc<ServerConfig>) -> Self {
        let mut router = OperationRouter::new();
        router.register(
            ResourceClass::Producer,
            ProducerService::new(gateway.clone(), config.publish_ack_timeout()),
        );
        router.register(
            ResourceClass::Admin,
            AdminService::new(gateway, config.admin_ack_timeout()),
        );

        Self {
            classifier: OperationService::new(Arc::clone(&registry), config),
            registry,
            pipeline: build_operation_pipeline(router),
        }
    }

    /// Capability Announcer: the registered operations, in registry order.
    #[must_use]
    pub fn announce(&self) -> &[OperationSpec] {
        self.registry.list_operations()
    }

    /// The announced operations rendered for `tools/list`.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.announce().iter().map(ToolDefinition::from).collect()
    }

    /// Dispatches a call whose arguments arrived as untyped JSON.
    ///
    /// Absent or `null` arguments are an empty bag. Any other non-object value
    /// is an invalid argument, reported only once the tool name is known to
    /// be registered.
    pub async fn dispatch_value(&mut self, name: &str, arguments: Option<Value>) -> ResultEnvelope {
        let args = match arguments {
            None | Some(Value::Null) => ArgumentBag::new(),
            Some(Value::Object(map)) => map,
            Some(_) if self.registry.lookup(name).is_none() => ArgumentBag::new(),
            Some(_) => {
                let err = OperationError::InvalidArgument(ValidationError::new(
                    "arguments",
                    ValidationReason::NotAnObject,
                ));
                return failure(name, &err);
            }
        };
        self.dispatch(name, &args).await
    }

    /// Dispatches one tool call: classify, run through the pipeline, wrap.
    pub async fn dispatch(&mut self, name: &str, args: &ArgumentBag) -> ResultEnvelope {
        debug!(
            tool = name,
            args = ?args.keys().collect::<Vec<_>>(),
            "dispatching tool call"
        );

        let op = match self.classifier.classify(name, args) {
            Ok(op) => op,
            Err(e) => return failure(name, &OperationError::from(e)),
        };

        let result = match ServiceExt::ready(&mut self.pipeline).await {
            Ok(svc) => svc.call(op).await,
            Err(e) => Err(e),
        };

        match result.and_then(render) {
            Ok(envelope) => envelope,
            Err(e) => failure(name, &e),
        }
    }
}

fn failure(name: &str, err: &OperationError) -> ResultEnvelope {
    warn!(tool = name, kind = %err.kind(), error = %err, "tool call failed");
    ResultEnvelope::err(name, err.kind(), err.to_string())
}

/// Renders a handler response as the envelope payload text.
fn render(response: OperationResponse) -> Result<ResultEnvelope, OperationError> {
    let envelope = match response {
        OperationResponse::Published { topic, receipt } => ResultEnvelope::ok(format!(
            "Message published successfully to topic '{topic}' (partition {}, offset {}).",
            receipt.partition, receipt.offset
        )),
        OperationResponse::Topics(topics) => ResultEnvelope::ok(
            serde_json::to_string(&topics).map_err(|e| OperationError::Internal(e.into()))?,
        ),
        OperationResponse::TopicInfo(info) => ResultEnvelope::ok(
            serde_json::to_string_pretty(&info).map_err(|e| OperationError::Internal(e.into()))?,
        ),
        OperationResponse::Deleted { topic } => ResultEnvelope::ok(format!(
            "Topic '{topic}' deleted successfully. Deletion may take time to complete on the broker."
        )),
        OperationResponse::Created {
            topic,
            num_partitions,
            replication_factor,
        } => ResultEnvelope::ok(format!(
            "Topic '{topic}' created successfully with {num_partitions} partition(s) and \
             replication factor {replication_factor}."
        )),
        OperationResponse::AlreadyExists { topic } => ResultEnvelope::ok_with_note(
            format!("Topic '{topic}' already exists; no changes were made."),
            ALREADY_EXISTS_NOTE,
        ),
    };
    Ok(envelope)
}
