//! `mcp-kafka` core: tool schemas, the schema registry, the result envelope,
//! broker configuration, and wire messages. No I/O.

pub mod broker;
pub mod catalog;
pub mod envelope;
pub mod messages;
pub mod schema;
pub mod types;

pub use broker::{
    BrokerAddress, BrokerConnectionConfig, ConfigError, DeliveryReceipt, NewTopicSpec,
    PartitionInfo, SaslCredentials, SaslMechanism, SaslSettings, SecurityProtocol, TopicInfo,
};
pub use catalog::{RegistryError, ToolKind, ToolRegistry};
pub use envelope::{ErrorKind, ResultEnvelope};
pub use schema::{
    Constraint, OperationSpec, ParameterKind, ParameterSpec, ResourceClass, ValidationError,
    ValidationReason,
};
pub use types::{ArgValue, ArgumentBag, ValidatedArgs};
