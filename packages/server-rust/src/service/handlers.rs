//! Operation handlers: one broker action per tool.
//!
//! Each handler receives a live handle from the gateway scope plus already
//! validated arguments, performs exactly one broker call, and maps the
//! broker's answer onto an `OperationResponse` or a typed `OperationError`.

use std::time::Duration;

use mcp_kafka_core::NewTopicSpec;
use tracing::{error, info, warn};

use crate::gateway::{AdminHandle, BrokerError, ProducerHandle};
use crate::service::operation::{OperationError, OperationResponse};

/// Publishes `message` (and `key`, when present) as raw UTF-8 bytes, waiting
/// up to `ack_timeout` for the acknowledgement.
///
/// # Errors
///
/// `Connection` if the broker became unreachable, otherwise `Publish` for any
/// NACK, timeout, or rejection.
pub async fn publish_message(
    producer: &dyn ProducerHandle,
    topic: &str,
    message: &str,
    key: Option<&str>,
    ack_timeout: Duration,
) -> Result<OperationResponse, OperationError> {
    info!(topic, keyed = key.is_some(), "publishing message");
    match producer
        .publish(topic, message.as_bytes(), key.map(str::as_bytes), ack_timeout)
        .await
    {
        Ok(receipt) => {
            info!(
                topic,
                partition = receipt.partition,
                offset = receipt.offset,
                "message published"
            );
            Ok(OperationResponse::Published {
                topic: topic.to_string(),
                receipt,
            })
        }
        Err(BrokerError::Unreachable(reason)) => {
            error!(topic, %reason, "broker unreachable while publishing");
            Err(OperationError::Connection(reason))
        }
        Err(e) => {
            error!(topic, error = %e, "failed to publish message");
            Err(OperationError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

/// Lists every topic name, sorted. An empty cluster is a success.
///
/// # Errors
///
/// `Connection` if the metadata query cannot complete.
pub async fn list_topics(admin: &dyn AdminHandle) -> Result<OperationResponse, OperationError> {
    let mut topics = admin.list_topics().await.map_err(|e| {
        error!(error = %e, "failed to list topics");
        match e {
            BrokerError::TimedOut { .. } => OperationError::from(e),
            other => OperationError::Connection(other.to_string()),
        }
    })?;
    topics.sort();
    info!(count = topics.len(), "listed topics");
    Ok(OperationResponse::Topics(topics))
}

/// Describes partitions and configuration of `topic`.
///
/// # Errors
///
/// `NotFound` if the topic does not exist.
pub async fn get_topic_info(
    admin: &dyn AdminHandle,
    topic: &str,
) -> Result<OperationResponse, OperationError> {
    match admin.describe_topic(topic).await {
        Ok(info) => {
            info!(topic, partitions = info.partitions.len(), "described topic");
            Ok(OperationResponse::TopicInfo(info))
        }
        Err(e @ BrokerError::UnknownTopic { .. }) => {
            warn!(topic, "topic not found");
            Err(e.into())
        }
        Err(e) => {
            error!(topic, error = %e, "failed to describe topic");
            Err(e.into())
        }
    }
}

/// Requests deletion, waiting up to `ack_timeout` for the acknowledgement.
///
/// # Errors
///
/// `NotFound` if the topic does not exist, `Timeout` if the acknowledgement
/// does not arrive in time. A timeout does not mean the deletion was dropped.
pub async fn delete_topic(
    admin: &dyn AdminHandle,
    topic: &str,
    ack_timeout: Duration,
) -> Result<OperationResponse, OperationError> {
    info!(topic, "deleting topic");
    match admin.delete_topic(topic, ack_timeout).await {
        Ok(()) => {
            info!(topic, "topic deletion acknowledged");
            Ok(OperationResponse::Deleted {
                topic: topic.to_string(),
            })
        }
        Err(e @ BrokerError::UnknownTopic { .. }) => {
            warn!(topic, "cannot delete: topic not found");
            Err(e.into())
        }
        Err(e) => {
            error!(topic, error = %e, "failed to delete topic");
            Err(e.into())
        }
    }
}

/// Requests creation. A topic that already exists is a success with a note.
///
/// # Errors
///
/// `Timeout` if the acknowledgement does not arrive in time, `Internal` if
/// the broker rejects the request for any other reason.
pub async fn create_topic(
    admin: &dyn AdminHandle,
    spec: &NewTopicSpec,
    ack_timeout: Duration,
) -> Result<OperationResponse, OperationError> {
    info!(
        topic = %spec.name,
        num_partitions = spec.num_partitions,
        replication_factor = spec.replication_factor,
        "creating topic"
    );
    match admin.create_topic(spec, ack_timeout).await {
        Ok(()) => {
            info!(topic = %spec.name, "topic created");
            Ok(OperationResponse::Created {
                topic: spec.name.clone(),
                num_partitions: spec.num_partitions,
                replication_factor: spec.replication_factor,
            })
        }
        Err(BrokerError::TopicExists { topic }) => {
            warn!(topic = %topic, "topic already exists");
            Ok(OperationResponse::AlreadyExists { topic })
        }
        Err(e) => {
            error!(topic = %spec.name, error = %e, "failed to create topic");
            Err(e.into())
        }
    }
}
