//! Domain services, one per broker resource class.
//!
//! Each service is a `tower::Service<Operation>` that opens a gateway scope
//! of its class, runs the matching handler inside it, and returns. The scope
//! is released before the service future completes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::Service;

use crate::gateway::BrokerGateway;
use crate::service::handlers;
use crate::service::operation::{Operation, OperationError, OperationResponse};

type ServiceFuture = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

// ---------------------------------------------------------------------------
// ProducerService
// ---------------------------------------------------------------------------

/// Handles producer-class operations (`publish_message`).
#[derive(Debug, Clone)]
pub struct ProducerService {
    gateway: BrokerGateway,
    ack_timeout: Duration,
}

impl ProducerService {
    #[must_use]
    pub fn new(gateway: BrokerGateway, ack_timeout: Duration) -> Self {
        Self {
            gateway,
            ack_timeout,
        }
    }
}

impl Service<Operation> for ProducerService {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let gateway = self.gateway.clone();
        let ack_timeout = self.ack_timeout;
        Box::pin(async move {
            match op {
                Operation::PublishMessage {
                    topic, message, key, ..
                } => {
                    gateway
                        .with_producer_scope(move |producer| {
                            Box::pin(async move {
                                handlers::publish_message(
                                    producer,
                                    &topic,
                                    &message,
                                    key.as_deref(),
                                    ack_timeout,
                                )
                                .await
                            })
                        })
                        .await
                }
                _ => Err(OperationError::WrongService),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// AdminService
// ---------------------------------------------------------------------------

/// Handles admin-class operations (topic listing, inspection, creation, deletion).
#[derive(Debug, Clone)]
pub struct AdminService {
    gateway: BrokerGateway,
    ack_timeout: Duration,
}

impl AdminService {
    #[must_use]
    pub fn new(gateway: BrokerGateway, ack_timeout: Duration) -> Self {
        Self {
            gateway,
            ack_timeout,
        }
    }
}

impl Service<Operation> for AdminService {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let gateway = self.gateway.clone();
        let ack_timeout = self.ack_timeout;
        Box::pin(async move {
            match op {
                Operation::ListTopics { .. } => {
                    gateway
                        .with_admin_scope(|admin| Box::pin(handlers::list_topics(admin)))
                        .await
                }
                Operation::GetTopicInfo { topic, .. } => {
                    gateway
                        .with_admin_scope(move |admin| {
                            Box::pin(async move { handlers::get_topic_info(admin, &topic).await })
                        })
                        .await
                }
                Operation::DeleteTopic { topic, .. } => {
                    gateway
                        .with_admin_scope(move |admin| {
                            Box::pin(async move {
                                handlers::delete_topic(admin, &topic, ack_timeout).await
                            })
                        })
                        .await
                }
                Operation::CreateTopic { spec, .. } => {
                    gateway
                        .with_admin_scope(move |admin| {
                            Box::pin(async move {
                                handlers::create_topic(admin, &spec, ack_timeout).await
                            })
                        })
                        .await
                }
                Operation::PublishMessage { .. } => Err(OperationError::WrongService),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
