//! librdkafka-backed broker connector.
//!
//! Producer handles wrap a `FutureProducer`; admin handles wrap an
//! `AdminClient`. Every handle is checked with a metadata fetch bounded by the
//! connect timeout before it is handed out, so an unreachable cluster surfaces
//! at acquisition time. Blocking librdkafka calls run on the blocking pool.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcp_kafka_core::{BrokerConnectionConfig, DeliveryReceipt, NewTopicSpec, PartitionInfo, TopicInfo};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, ResourceSpecifier, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, warn};

use super::{AdminHandle, BrokerConnector, BrokerError, BrokerHandle, ProducerHandle};

const CLIENT_ID: &str = "mcp-kafka";

// ---------------------------------------------------------------------------
// KafkaConnector
// ---------------------------------------------------------------------------

/// Opens librdkafka clients for each operation.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    connect_timeout: Duration,
    /// `message.timeout.ms` for producers; the publish acknowledgement bound.
    delivery_timeout: Duration,
}

impl KafkaConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration, delivery_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            delivery_timeout,
        }
    }
}

/// Translates connection settings into librdkafka properties.
fn client_config(config: &BrokerConnectionConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_servers())
        .set(
            "security.protocol",
            config.security_protocol().as_str().to_ascii_lowercase(),
        )
        .set("client.id", CLIENT_ID);
    if let Some(sasl) = config.sasl() {
        client
            .set("sasl.mechanism", sasl.mechanism.as_str())
            .set("sasl.username", sasl.credentials.username())
            .set("sasl.password", sasl.credentials.password());
    }
    client
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Runs a blocking librdkafka call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, BrokerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BrokerError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrokerError::Other(format!("blocking Kafka call failed: {e}")))?
}

fn map_code(code: RDKafkaErrorCode, topic: &str, timeout_ms: u64) -> BrokerError {
    match code {
        RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
            BrokerError::UnknownTopic {
                topic: topic.to_string(),
            }
        }
        RDKafkaErrorCode::TopicAlreadyExists => BrokerError::TopicExists {
            topic: topic.to_string(),
        },
        RDKafkaErrorCode::RequestTimedOut
        | RDKafkaErrorCode::OperationTimedOut
        | RDKafkaErrorCode::MessageTimedOut => BrokerError::TimedOut { timeout_ms },
        RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::Authentication
        | RDKafkaErrorCode::SaslAuthenticationFailed => BrokerError::Unreachable(code.to_string()),
        other => BrokerError::Rejected(other.to_string()),
    }
}

fn map_kafka_error(err: &KafkaError, topic: &str, timeout_ms: u64) -> BrokerError {
    match err.rdkafka_error_code() {
        Some(code) => map_code(code, topic, timeout_ms),
        None => BrokerError::Other(err.to_string()),
    }
}

/// Any failure while opening or probing a client means the cluster is unreachable.
fn unreachable(err: &KafkaError) -> BrokerError {
    BrokerError::Unreachable(err.to_string())
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn connect_producer(
        &self,
        config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn ProducerHandle>, BrokerError> {
        let mut client = client_config(config);
        client.set("message.timeout.ms", millis(self.delivery_timeout).to_string());
        let producer: FutureProducer = client.create().map_err(|e| unreachable(&e))?;

        let probe = producer.clone();
        let timeout = self.connect_timeout;
        blocking(move || {
            probe
                .client()
                .fetch_metadata(None, timeout)
                .map(|_| ())
                .map_err(|e| unreachable(&e))
        })
        .await?;

        Ok(Box::new(KafkaProducer {
            producer,
            flush_timeout: self.delivery_timeout,
        }))
    }

    async fn connect_admin(
        &self,
        config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn AdminHandle>, BrokerError> {
        let mut client = client_config(config);
        // Describing a missing topic must not create it.
        client.set("allow.auto.create.topics", "false");
        let admin: AdminClient<DefaultClientContext> =
            client.create().map_err(|e| unreachable(&e))?;
        let admin = Arc::new(admin);

        let probe = Arc::clone(&admin);
        let timeout = self.connect_timeout;
        blocking(move || {
            probe
                .inner()
                .fetch_metadata(None, timeout)
                .map(|_| ())
                .map_err(|e| unreachable(&e))
        })
        .await?;

        Ok(Box::new(KafkaAdmin {
            admin,
            metadata_timeout: self.connect_timeout,
        }))
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

struct KafkaProducer {
    producer: FutureProducer,
    flush_timeout: Duration,
}

#[async_trait]
impl BrokerHandle for KafkaProducer {
    async fn close(&self) {
        let producer = self.producer.clone();
        let timeout = self.flush_timeout;
        let flushed = blocking(move || {
            producer
                .flush(timeout)
                .map_err(|e| BrokerError::Other(e.to_string()))
        })
        .await;
        if let Err(e) = flushed {
            warn!(error = %e, "failed to flush Kafka producer on close");
        }
    }
}

#[async_trait]
impl ProducerHandle for KafkaProducer {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        key: Option<&[u8]>,
        ack_timeout: Duration,
    ) -> Result<DeliveryReceipt, BrokerError> {
        let timeout_ms = millis(ack_timeout);
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        let delivery = self.producer.send(record, Timeout::After(ack_timeout));
        match tokio::time::timeout(ack_timeout, delivery).await {
            Ok(Ok((partition, offset))) => {
                debug!(topic, partition, offset, "message acknowledged");
                Ok(DeliveryReceipt { partition, offset })
            }
            Ok(Err((err, _message))) => Err(map_kafka_error(&err, topic, timeout_ms)),
            Err(_) => Err(BrokerError::TimedOut { timeout_ms }),
        }
    }
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

struct KafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    metadata_timeout: Duration,
}

impl KafkaAdmin {
    fn options(ack_timeout: Duration) -> AdminOptions {
        AdminOptions::new()
            .operation_timeout(Some(ack_timeout))
            .request_timeout(Some(ack_timeout))
    }

    async fn describe_configs(&self, topic: &str) -> Result<BTreeMap<String, String>, BrokerError> {
        let timeout_ms = millis(self.metadata_timeout);
        let results = self
            .admin
            .describe_configs(
                &[ResourceSpecifier::Topic(topic)],
                &Self::options(self.metadata_timeout),
            )
            .await
            .map_err(|e| map_kafka_error(&e, topic, timeout_ms))?;

        let mut configuration = BTreeMap::new();
        for result in results {
            let resource = result.map_err(|code| map_code(code, topic, timeout_ms))?;
            for entry in resource.entries {
                if entry.is_sensitive {
                    continue;
                }
                if let Some(value) = entry.value {
                    configuration.insert(entry.name, value);
                }
            }
        }
        Ok(configuration)
    }
}

#[async_trait]
impl BrokerHandle for KafkaAdmin {
    async fn close(&self) {
        // librdkafka tears the client down when the last reference drops.
        debug!("releasing Kafka admin client");
    }
}

#[async_trait]
impl AdminHandle for KafkaAdmin {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.metadata_timeout;
        blocking(move || {
            let metadata = admin
                .inner()
                .fetch_metadata(None, timeout)
                .map_err(|e| map_kafka_error(&e, "", millis(timeout)))?;
            let mut names: Vec<String> = metadata
                .topics()
                .iter()
                .map(|t| t.name().to_string())
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicInfo, BrokerError> {
        let admin = Arc::clone(&self.admin);
        let timeout = self.metadata_timeout;
        let name = topic.to_string();
        let partitions = blocking(move || {
            let metadata = admin
                .inner()
                .fetch_metadata(Some(&name), timeout)
                .map_err(|e| map_kafka_error(&e, &name, millis(timeout)))?;
            let Some(found) = metadata.topics().iter().find(|t| t.name() == name) else {
                return Err(BrokerError::UnknownTopic { topic: name });
            };
            if let Some(err) = found.error() {
                return Err(map_code(RDKafkaErrorCode::from(err), &name, millis(timeout)));
            }
            Ok(found
                .partitions()
                .iter()
                .map(|p| PartitionInfo {
                    partition_id: p.id(),
                    leader: p.leader(),
                    replicas: p.replicas().to_vec(),
                    isr: p.isr().to_vec(),
                })
                .collect::<Vec<_>>())
        })
        .await?;

        let configuration = self.describe_configs(topic).await?;
        Ok(TopicInfo {
            topic_name: topic.to_string(),
            is_internal: topic.starts_with("__"),
            partitions,
            configuration,
        })
    }

    async fn create_topic(
        &self,
        spec: &NewTopicSpec,
        ack_timeout: Duration,
    ) -> Result<(), BrokerError> {
        let timeout_ms = millis(ack_timeout);
        let mut new_topic = NewTopic::new(
            &spec.name,
            spec.num_partitions,
            TopicReplication::Fixed(i32::from(spec.replication_factor)),
        );
        for (key, value) in &spec.config {
            new_topic = new_topic.set(key, value);
        }
        let options = Self::options(ack_timeout);
        let results = tokio::time::timeout(
            ack_timeout,
            self.admin.create_topics(&[new_topic], &options),
        )
        .await
        .map_err(|_| BrokerError::TimedOut { timeout_ms })?
        .map_err(|e| map_kafka_error(&e, &spec.name, timeout_ms))?;

        for result in results {
            result.map_err(|(topic, code)| map_code(code, &topic, timeout_ms))?;
        }
        Ok(())
    }

    async fn delete_topic(&self, topic: &str, ack_timeout: Duration) -> Result<(), BrokerError> {
        let timeout_ms = millis(ack_timeout);
        let options = Self::options(ack_timeout);
        let results = tokio::time::timeout(ack_timeout, self.admin.delete_topics(&[topic], &options))
            .await
            .map_err(|_| BrokerError::TimedOut { timeout_ms })?
            .map_err(|e| map_kafka_error(&e, topic, timeout_ms))?;

        for result in results {
            result.map_err(|(name, code)| map_code(code, &name, timeout_ms))?;
        }
        Ok(())
    }
}
