//! Wire message schemas for the stdio protocol.
//!
//! The transport speaks JSON-RPC 2.0 ([`jsonrpc`]) carrying Model Context
//! Protocol payloads ([`mcp`]). All MCP structs use
//! `#[serde(rename_all = "camelCase")]` to match the protocol's field names.

pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
pub use mcp::{
    methods, negotiate_protocol_version, CallToolParams, CallToolResult, Content, Implementation,
    InitializeParams, InitializeResult, ListToolsResult, ServerCapabilities, ToolDefinition,
    ToolsCapability, LATEST_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
