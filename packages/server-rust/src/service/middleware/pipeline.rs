//! Pipeline composition: combines all middleware layers into a single service stack.

use tower::util::BoxService;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::operation::{Operation, OperationError, OperationResponse};
use crate::service::router::OperationRouter;

/// The composed, type-erased operation pipeline.
pub type OperationPipeline = BoxService<Operation, OperationResponse, OperationError>;

/// Build the operation pipeline by wrapping the `OperationRouter` with middleware layers.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- enforce the per-operation bound from the context
/// 2. `MetricsLayer` -- record timing and outcome (closest to the actual handler)
#[must_use]
pub fn build_operation_pipeline(router: OperationRouter) -> OperationPipeline {
    BoxService::new(
        ServiceBuilder::new()
            .layer(TimeoutLayer)
            .layer(MetricsLayer)
            .service(router),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
