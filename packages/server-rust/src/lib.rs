//! `mcp-kafka` server: Kafka operations exposed as MCP tools over stdio.

pub mod cli;
pub mod gateway;
pub mod logging;
pub mod network;
pub mod service;

pub use gateway::{BrokerGateway, MemoryBroker};
pub use network::{McpHandler, ShutdownController, StdioTransport};
pub use service::{Dispatcher, ServerConfig};
