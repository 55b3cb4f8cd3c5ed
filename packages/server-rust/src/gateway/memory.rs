//! In-memory broker backed by [`DashMap`].
//!
//! Behaves like a small Kafka cluster (topics, partitions, replica placement,
//! default topic configs) without any network. Counts every acquisition and
//! release, and can inject faults: an unreachable cluster, NACKed publishes,
//! and acknowledgements that never arrive.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mcp_kafka_core::{BrokerConnectionConfig, DeliveryReceipt, NewTopicSpec, PartitionInfo, TopicInfo};
use parking_lot::Mutex;

use super::{AdminHandle, BrokerConnector, BrokerError, BrokerHandle, ProducerHandle};

/// Largest partition count a topic may be created with.
pub const MAX_PARTITIONS_PER_TOPIC: i32 = 10_000;

/// Configs every topic reports unless overridden at creation.
const DEFAULT_TOPIC_CONFIGS: [(&str, &str); 4] = [
    ("cleanup.policy", "delete"),
    ("max.message.bytes", "1048588"),
    ("min.insync.replicas", "1"),
    ("retention.ms", "604800000"),
];

// ---------------------------------------------------------------------------
// Faults and stats
// ---------------------------------------------------------------------------

/// Fault switches. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Every connection attempt fails.
    pub unreachable: bool,
    /// Every publish is NACKed by the broker.
    pub reject_publish: bool,
    /// Acknowledgements never arrive: create/delete run into their ack bound,
    /// publishes hang until cancelled.
    pub stall_acks: bool,
}

/// Snapshot of acquisition counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub connect_attempts: u64,
    pub producers_opened: u64,
    pub producers_closed: u64,
    pub admins_opened: u64,
    pub admins_closed: u64,
}

impl BrokerStats {
    /// Handles opened but not yet closed.
    #[must_use]
    pub fn open_handles(&self) -> u64 {
        (self.producers_opened + self.admins_opened)
            .saturating_sub(self.producers_closed + self.admins_closed)
    }
}

#[derive(Debug, Default)]
struct Counters {
    connect_attempts: AtomicU64,
    producers_opened: AtomicU64,
    producers_closed: AtomicU64,
    admins_opened: AtomicU64,
    admins_closed: AtomicU64,
}

// ---------------------------------------------------------------------------
// Cluster state
// ---------------------------------------------------------------------------

/// A message as stored by the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct MemoryTopic {
    partitions: Vec<Vec<StoredMessage>>,
    replication_factor: i16,
    config: BTreeMap<String, String>,
    next_partition: usize,
}

#[derive(Debug)]
struct ClusterState {
    broker_count: i32,
    auto_create_topics: bool,
    topics: DashMap<String, MemoryTopic>,
    faults: Mutex<Faults>,
    counters: Counters,
}

impl ClusterState {
    fn faults(&self) -> Faults {
        *self.faults.lock()
    }

    fn insert_topic(&self, spec: &NewTopicSpec) -> Result<(), BrokerError> {
        if spec.num_partitions < 1 || spec.num_partitions > MAX_PARTITIONS_PER_TOPIC {
            return Err(BrokerError::Rejected(format!(
                "partition count must be between 1 and {MAX_PARTITIONS_PER_TOPIC}, got {}",
                spec.num_partitions
            )));
        }
        if spec.replication_factor < 1 || i32::from(spec.replication_factor) > self.broker_count {
            return Err(BrokerError::Rejected(format!(
                "replication factor {} is larger than the {} available broker(s)",
                spec.replication_factor, self.broker_count
            )));
        }
        match self.topics.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(BrokerError::TopicExists {
                topic: spec.name.clone(),
            }),
            Entry::Vacant(slot) => {
                let mut config: BTreeMap<String, String> = DEFAULT_TOPIC_CONFIGS
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect();
                config.extend(spec.config.clone());
                let partitions = usize::try_from(spec.num_partitions).unwrap_or(1);
                slot.insert(MemoryTopic {
                    partitions: vec![Vec::new(); partitions],
                    replication_factor: spec.replication_factor,
                    config,
                    next_partition: 0,
                });
                Ok(())
            }
        }
    }

    fn describe(&self, name: &str) -> Result<TopicInfo, BrokerError> {
        let topic = self.topics.get(name).ok_or_else(|| BrokerError::UnknownTopic {
            topic: name.to_string(),
        })?;
        let rf = i32::from(topic.replication_factor);
        let partitions = (0..topic.partitions.len())
            .map(|index| {
                let partition_id = i32::try_from(index).unwrap_or(i32::MAX);
                let replicas: Vec<i32> = (0..rf)
                    .map(|r| (partition_id + r) % self.broker_count + 1)
                    .collect();
                PartitionInfo {
                    partition_id,
                    leader: replicas.first().copied().unwrap_or(-1),
                    isr: replicas.clone(),
                    replicas,
                }
            })
            .collect();
        Ok(TopicInfo {
            topic_name: name.to_string(),
            is_internal: name.starts_with("__"),
            partitions,
            configuration: topic.config.clone(),
        })
    }

    fn append(
        &self,
        topic: &str,
        payload: &[u8],
        key: Option<&[u8]>,
    ) -> Result<DeliveryReceipt, BrokerError> {
        if !self.topics.contains_key(topic) {
            if !self.auto_create_topics {
                return Err(BrokerError::UnknownTopic {
                    topic: topic.to_string(),
                });
            }
            let spec = NewTopicSpec {
                name: topic.to_string(),
                num_partitions: 1,
                replication_factor: 1,
                config: BTreeMap::new(),
            };
            match self.insert_topic(&spec) {
                Ok(()) | Err(BrokerError::TopicExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let mut entry = self.topics.get_mut(topic).ok_or_else(|| BrokerError::UnknownTopic {
            topic: topic.to_string(),
        })?;
        let state = entry.value_mut();
        let count = state.partitions.len().max(1);
        let index = match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                usize::try_from(hasher.finish() % count as u64).unwrap_or(0)
            }
            None => {
                let index = state.next_partition % count;
                state.next_partition = state.next_partition.wrapping_add(1);
                index
            }
        };
        let log = &mut state.partitions[index];
        let receipt = DeliveryReceipt {
            partition: i32::try_from(index).unwrap_or(i32::MAX),
            offset: i64::try_from(log.len()).unwrap_or(i64::MAX),
        };
        log.push(StoredMessage {
            partition: receipt.partition,
            offset: receipt.offset,
            key: key.map(<[u8]>::to_vec),
            payload: payload.to_vec(),
        });
        Ok(receipt)
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// Connector for the in-memory cluster. Clones share the same cluster.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<ClusterState>,
}

impl MemoryBroker {
    /// Single-broker cluster that auto-creates topics on publish.
    #[must_use]
    pub fn new() -> Self {
        Self::with_brokers(1)
    }

    /// Cluster with `broker_count` brokers (ids `1..=broker_count`).
    #[must_use]
    pub fn with_brokers(broker_count: i32) -> Self {
        Self {
            state: Arc::new(ClusterState {
                broker_count: broker_count.max(1),
                auto_create_topics: true,
                topics: DashMap::new(),
                faults: Mutex::new(Faults::default()),
                counters: Counters::default(),
            }),
        }
    }

    /// Disables topic auto-creation on publish.
    #[must_use]
    pub fn without_auto_create(self) -> Self {
        let state = ClusterState {
            broker_count: self.state.broker_count,
            auto_create_topics: false,
            topics: DashMap::new(),
            faults: Mutex::new(self.state.faults()),
            counters: Counters::default(),
        };
        Self {
            state: Arc::new(state),
        }
    }

    pub fn set_faults(&self, faults: Faults) {
        *self.state.faults.lock() = faults;
    }

    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let c = &self.state.counters;
        BrokerStats {
            connect_attempts: c.connect_attempts.load(Ordering::SeqCst),
            producers_opened: c.producers_opened.load(Ordering::SeqCst),
            producers_closed: c.producers_closed.load(Ordering::SeqCst),
            admins_opened: c.admins_opened.load(Ordering::SeqCst),
            admins_closed: c.admins_closed.load(Ordering::SeqCst),
        }
    }

    /// Creates a topic directly, bypassing the handle counters.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::TopicExists` or `BrokerError::Rejected` as a
    /// real create request would.
    pub fn seed_topic(&self, spec: &NewTopicSpec) -> Result<(), BrokerError> {
        self.state.insert_topic(spec)
    }

    #[must_use]
    pub fn has_topic(&self, name: &str) -> bool {
        self.state.topics.contains_key(name)
    }

    /// All messages stored for `topic`, ordered by partition then offset.
    #[must_use]
    pub fn messages(&self, topic: &str) -> Vec<StoredMessage> {
        self.state
            .topics
            .get(topic)
            .map(|t| t.partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), BrokerError> {
        self.state.counters.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.state.faults().unreachable {
            return Err(BrokerError::Unreachable(
                "all brokers are down (in-memory cluster marked unreachable)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect_producer(
        &self,
        _config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn ProducerHandle>, BrokerError> {
        self.check_reachable()?;
        self.state.counters.producers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryProducer {
            state: Arc::clone(&self.state),
        }))
    }

    async fn connect_admin(
        &self,
        _config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn AdminHandle>, BrokerError> {
        self.check_reachable()?;
        self.state.counters.admins_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryAdmin {
            state: Arc::clone(&self.state),
        }))
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

struct MemoryProducer {
    state: Arc<ClusterState>,
}

#[async_trait]
impl BrokerHandle for MemoryProducer {
    async fn close(&self) {
        self.state.counters.producers_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProducerHandle for MemoryProducer {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        key: Option<&[u8]>,
        ack_timeout: Duration,
    ) -> Result<DeliveryReceipt, BrokerError> {
        let faults = self.state.faults();
        if faults.stall_acks {
            tokio::time::sleep(ack_timeout).await;
            return Err(BrokerError::TimedOut {
                timeout_ms: u64::try_from(ack_timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        if faults.reject_publish {
            return Err(BrokerError::Rejected(
                "message rejected by broker (NOT_ENOUGH_REPLICAS)".to_string(),
            ));
        }
        self.state.append(topic, payload, key)
    }
}

struct MemoryAdmin {
    state: Arc<ClusterState>,
}

impl MemoryAdmin {
    /// Waits out the ack bound when acknowledgements are stalled.
    async fn await_ack(&self, ack_timeout: Duration) -> Result<(), BrokerError> {
        if self.state.faults().stall_acks {
            tokio::time::sleep(ack_timeout).await;
            return Err(BrokerError::TimedOut {
                timeout_ms: u64::try_from(ack_timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerHandle for MemoryAdmin {
    async fn close(&self) {
        self.state.counters.admins_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AdminHandle for MemoryAdmin {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        let mut names: Vec<String> = self.state.topics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn describe_topic(&self, topic: &str) -> Result<TopicInfo, BrokerError> {
        self.state.describe(topic)
    }

    async fn create_topic(
        &self,
        spec: &NewTopicSpec,
        ack_timeout: Duration,
    ) -> Result<(), BrokerError> {
        self.await_ack(ack_timeout).await?;
        self.state.insert_topic(spec)
    }

    async fn delete_topic(&self, topic: &str, ack_timeout: Duration) -> Result<(), BrokerError> {
        self.await_ack(ack_timeout).await?;
        self.state
            .topics
            .remove(topic)
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownTopic {
                topic: topic.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
