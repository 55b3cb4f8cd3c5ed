//! Operation routing and execution framework.
//!
//! A tool call flows through these stages:
//!
//! 1. **Classification** (`classify`): name + arguments -> `Result<Operation, ClassifyError>`
//! 2. **Middleware** (`middleware`): Tower layers (timeout, metrics)
//! 3. **Routing** (`router`): Dispatch to the domain service for the resource class
//! 4. **Domain services** (`domain`): open a gateway scope and run a handler
//! 5. **Dispatch** (`dispatcher`): wrap every outcome in a `ResultEnvelope`

pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod handlers;
pub mod middleware;
pub mod operation;
pub mod router;

// Re-export key types for convenient access.
pub use classify::OperationService;
pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, ALREADY_EXISTS_NOTE};
pub use domain::{AdminService, ProducerService};
pub use operation::{
    ClassifyError, Operation, OperationContext, OperationError, OperationResponse,
};
pub use router::OperationRouter;
