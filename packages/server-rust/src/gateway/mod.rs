//! Broker Gateway: scoped acquisition and release of broker handles.
//!
//! A [`BrokerConnector`] opens producer-class or admin-class handles.
//! [`BrokerGateway`] wraps each acquisition in a scope that releases the
//! handle exactly once, on success, on handler failure, and when the scope
//! future is dropped mid-flight (e.g. by the timeout middleware).

pub mod memory;
pub mod tracker;

#[cfg(feature = "kafka")]
pub mod kafka;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use mcp_kafka_core::{BrokerConnectionConfig, DeliveryReceipt, NewTopicSpec, TopicInfo};
use tracing::{debug, info, warn};

use crate::service::operation::OperationError;

pub use memory::{BrokerStats, Faults, MemoryBroker};
pub use tracker::{ReleaseGuard, ReleaseTracker};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a broker backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("{0}")]
    Unreachable(String),
    #[error("topic '{topic}' does not exist")]
    UnknownTopic { topic: String },
    #[error("topic '{topic}' already exists")]
    TopicExists { topic: String },
    #[error("broker rejected the request: {0}")]
    Rejected(String),
    #[error("broker did not acknowledge within {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Handle traits
// ---------------------------------------------------------------------------

/// A live connection owned by exactly one operation.
#[async_trait]
pub trait BrokerHandle: Send + Sync {
    /// Releases the connection. The gateway calls this exactly once.
    async fn close(&self);
}

/// Producer-class handle.
#[async_trait]
pub trait ProducerHandle: BrokerHandle {
    /// Sends one message and waits up to `ack_timeout` for the broker
    /// acknowledgement.
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        key: Option<&[u8]>,
        ack_timeout: Duration,
    ) -> Result<DeliveryReceipt, BrokerError>;
}

/// Admin-class handle.
#[async_trait]
pub trait AdminHandle: BrokerHandle {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    async fn describe_topic(&self, topic: &str) -> Result<TopicInfo, BrokerError>;

    /// Requests creation and waits up to `ack_timeout` for the acknowledgement.
    async fn create_topic(
        &self,
        spec: &NewTopicSpec,
        ack_timeout: Duration,
    ) -> Result<(), BrokerError>;

    /// Requests deletion and waits up to `ack_timeout` for the acknowledgement.
    async fn delete_topic(&self, topic: &str, ack_timeout: Duration) -> Result<(), BrokerError>;
}

/// Opens handles against a broker cluster.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect_producer(
        &self,
        config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn ProducerHandle>, BrokerError>;

    async fn connect_admin(
        &self,
        config: &BrokerConnectionConfig,
    ) -> Result<Box<dyn AdminHandle>, BrokerError>;
}

// ---------------------------------------------------------------------------
// BrokerGateway
// ---------------------------------------------------------------------------

/// Acquires per-operation broker handles and guarantees their release.
#[derive(Clone)]
pub struct BrokerGateway {
    connector: Arc<dyn BrokerConnector>,
    config: Arc<BrokerConnectionConfig>,
    releases: ReleaseTracker,
}

impl BrokerGateway {
    #[must_use]
    pub fn new(connector: Arc<dyn BrokerConnector>, config: Arc<BrokerConnectionConfig>) -> Self {
        Self {
            connector,
            config,
            releases: ReleaseTracker::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BrokerConnectionConfig {
        &self.config
    }

    /// Handles being closed in the background after a cancelled scope.
    #[must_use]
    pub fn releases(&self) -> &ReleaseTracker {
        &self.releases
    }

    /// Runs `f` with a fresh producer handle, releasing it afterwards.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Connection` if the handle cannot be opened,
    /// otherwise whatever `f` returns.
    pub async fn with_producer_scope<T, F>(&self, f: F) -> Result<T, OperationError>
    where
        T: Send,
        F: for<'h> FnOnce(&'h dyn ProducerHandle) -> BoxFuture<'h, Result<T, OperationError>>
            + Send,
    {
        debug!("starting Kafka producer");
        let handle = self
            .connector
            .connect_producer(&self.config)
            .await
            .map_err(connection_error)?;
        info!("Kafka producer started");
        let mut scope = Scope::new("producer", handle, &self.releases);
        let result = match scope.handle() {
            Ok(handle) => f(handle).await,
            Err(e) => Err(e),
        };
        scope.release().await;
        result
    }

    /// Runs `f` with a fresh admin handle, releasing it afterwards.
    ///
    /// # Errors
    ///
    /// Returns `OperationError::Connection` if the handle cannot be opened,
    /// otherwise whatever `f` returns.
    pub async fn with_admin_scope<T, F>(&self, f: F) -> Result<T, OperationError>
    where
        T: Send,
        F: for<'h> FnOnce(&'h dyn AdminHandle) -> BoxFuture<'h, Result<T, OperationError>> + Send,
    {
        debug!("starting Kafka admin client");
        let handle = self
            .connector
            .connect_admin(&self.config)
            .await
            .map_err(connection_error)?;
        info!("Kafka admin client started");
        let mut scope = Scope::new("admin", handle, &self.releases);
        let result = match scope.handle() {
            Ok(handle) => f(handle).await,
            Err(e) => Err(e),
        };
        scope.release().await;
        result
    }
}

impl std::fmt::Debug for BrokerGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Any failure to open a handle is a connection failure, whatever its cause.
fn connection_error(err: BrokerError) -> OperationError {
    warn!(error = %err, "failed to connect to Kafka");
    OperationError::Connection(err.to_string())
}

// ---------------------------------------------------------------------------
// Scope guard
// ---------------------------------------------------------------------------

/// Owns a handle for the duration of one operation.
///
/// `release` closes the handle in place. If the guard is dropped without
/// `release` (the enclosing future was cancelled), `Drop` hands the handle
/// to the runtime to close in the background, tracked by `releases`.
struct Scope<H: ?Sized + BrokerHandle + 'static> {
    class: &'static str,
    handle: Option<Box<H>>,
    releases: ReleaseTracker,
}

impl<H: ?Sized + BrokerHandle + 'static> Scope<H> {
    fn new(class: &'static str, handle: Box<H>, releases: &ReleaseTracker) -> Self {
        Self {
            class,
            handle: Some(handle),
            releases: releases.clone(),
        }
    }

    fn handle(&self) -> Result<&H, OperationError> {
        self.handle.as_deref().ok_or_else(|| {
            OperationError::Internal(anyhow::anyhow!("{} handle used after release", self.class))
        })
    }

    async fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(class = self.class, "stopping Kafka client");
            handle.close().await;
            info!(class = self.class, "Kafka client stopped");
        }
    }
}

impl<H: ?Sized + BrokerHandle + 'static> Drop for Scope<H> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let class = self.class;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(class, "operation cancelled; closing Kafka client in background");
                let guard = self.releases.track();
                runtime.spawn(async move {
                    handle.close().await;
                    info!(class, "Kafka client stopped");
                    drop(guard);
                });
            }
            Err(_) => {
                warn!(class, "no runtime available; Kafka client dropped without close");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
