//! Call classification: converts a tool name plus argument bag into a typed `Operation`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcp_kafka_core::{
    ArgumentBag, NewTopicSpec, ResourceClass, ToolKind, ToolRegistry, ValidatedArgs,
    ValidationError, ValidationReason,
};

use super::config::ServerConfig;
use super::operation::{ClassifyError, Operation, OperationContext};

// ---------------------------------------------------------------------------
// OperationService
// ---------------------------------------------------------------------------

/// Classifies incoming tool calls into typed `Operation` variants.
///
/// Lookup happens first, so an unknown name is reported before its arguments
/// are examined. Validation runs entirely from the registered spec; nothing
/// here touches the broker.
pub struct OperationService {
    registry: Arc<ToolRegistry>,
    config: Arc<ServerConfig>,
    call_id_counter: AtomicU64,
}

impl OperationService {
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, config: Arc<ServerConfig>) -> Self {
        Self {
            registry,
            config,
            call_id_counter: AtomicU64::new(1),
        }
    }

    fn next_call_id(&self) -> u64 {
        self.call_id_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn make_ctx(&self, tool: ToolKind, class: ResourceClass) -> OperationContext {
        OperationContext::new(
            self.next_call_id(),
            tool,
            class,
            self.config.timeout_for(tool),
        )
    }

    /// Classify a tool call into an `Operation`.
    ///
    /// # Errors
    ///
    /// - `ClassifyError::UnknownOperation` if `name` is not registered
    /// - `ClassifyError::InvalidArgument` naming the first field that fails validation
    pub fn classify(&self, name: &str, args: &ArgumentBag) -> Result<Operation, ClassifyError> {
        let unknown = || ClassifyError::UnknownOperation {
            name: name.to_string(),
        };
        let spec = self.registry.lookup(name).ok_or_else(unknown)?;
        // `ToolRegistry::new` only admits names with a kind, on that kind's class.
        let tool = ToolKind::from_name(spec.name).ok_or_else(unknown)?;
        let args = spec.validate(args)?;
        let ctx = self.make_ctx(tool, spec.resource_class);

        let op = match tool {
            ToolKind::PublishMessage => Operation::PublishMessage {
                ctx,
                topic: required_string(&args, "topic")?,
                message: required_string(&args, "message")?,
                key: args
                    .string("key")
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            },
            ToolKind::ListTopics => Operation::ListTopics { ctx },
            ToolKind::GetTopicInfo => Operation::GetTopicInfo {
                ctx,
                topic: required_string(&args, "topic")?,
            },
            ToolKind::DeleteTopic => Operation::DeleteTopic {
                ctx,
                topic: required_string(&args, "topic")?,
            },
            ToolKind::CreateTopic => Operation::CreateTopic {
                ctx,
                spec: NewTopicSpec {
                    name: required_string(&args, "topic")?,
                    num_partitions: narrowed(&args, "num_partitions")?,
                    replication_factor: narrowed(&args, "replication_factor")?,
                    config: args.string_map("config").cloned().unwrap_or_else(BTreeMap::new),
                },
            },
        };
        Ok(op)
    }
}

fn required_string(args: &ValidatedArgs, name: &'static str) -> Result<String, ClassifyError> {
    args.string(name)
        .map(str::to_string)
        .ok_or_else(|| ValidationError::new(name, ValidationReason::Missing).into())
}

/// Reads an integer argument and narrows it to the broker's width.
///
/// Defaults come from the registered spec; an absent value here means the
/// spec declares none.
fn narrowed<T: TryFrom<i64>>(args: &ValidatedArgs, name: &'static str) -> Result<T, ClassifyError> {
    let value = args
        .int(name)
        .ok_or_else(|| ValidationError::new(name, ValidationReason::Missing))?;
    T::try_from(value).map_err(|_| ValidationError::new(name, ValidationReason::IntegerOverflow).into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
