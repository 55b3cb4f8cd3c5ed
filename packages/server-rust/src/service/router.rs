//! Operation routing: hands each `Operation` to the service for its resource class.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use mcp_kafka_core::ResourceClass;
use tower::util::BoxService;
use tower::Service;

use super::operation::{Operation, OperationError, OperationResponse};

/// Domain service for one resource class, type-erased.
type ClassService = BoxService<Operation, OperationResponse, OperationError>;

/// Routes operations to the producer or admin service.
///
/// There is one slot per [`ResourceClass`]. An operation whose class has no
/// registered service fails with `OperationError::Unrouted`.
#[derive(Default)]
pub struct OperationRouter {
    producer: Option<ClassService>,
    admin: Option<ClassService>,
}

impl OperationRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `service` for `class`, replacing any earlier registration.
    pub fn register<S>(&mut self, class: ResourceClass, service: S)
    where
        S: Service<Operation, Response = OperationResponse, Error = OperationError> + Send + 'static,
        S::Future: Send + 'static,
    {
        *self.slot(class) = Some(BoxService::new(service));
    }

    #[must_use]
    pub fn is_registered(&self, class: ResourceClass) -> bool {
        match class {
            ResourceClass::Producer => self.producer.is_some(),
            ResourceClass::Admin => self.admin.is_some(),
        }
    }

    fn slot(&mut self, class: ResourceClass) -> &mut Option<ClassService> {
        match class {
            ResourceClass::Producer => &mut self.producer,
            ResourceClass::Admin => &mut self.admin,
        }
    }
}

impl Service<Operation> for OperationRouter {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        for svc in [&mut self.producer, &mut self.admin].into_iter().flatten() {
            match svc.poll_ready(cx) {
                Poll::Ready(Ok(())) => {}
                other => return other,
            }
        }
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, op: Operation) -> Self::Future {
        let class = op.ctx().resource_class;
        match self.slot(class) {
            Some(svc) => svc.call(op),
            None => Box::pin(async move { Err(OperationError::Unrouted { class }) }),
        }
    }
}
