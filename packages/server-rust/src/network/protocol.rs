//! MCP request handling: one JSON-RPC frame in, at most one response out.
//!
//! Frame-level problems (bad JSON, malformed requests, unknown methods) are
//! answered with JSON-RPC errors. Tool outcomes, including failed ones, are
//! always successful responses carrying the rendered envelope.

use mcp_kafka_core::messages::{
    error_codes, methods, negotiate_protocol_version, CallToolParams, CallToolResult,
    Implementation, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, ServerCapabilities, JSONRPC_VERSION,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::service::Dispatcher;

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "mcp-kafka";

/// Handles decoded MCP frames against a [`Dispatcher`].
pub struct McpHandler {
    dispatcher: Dispatcher,
}

impl McpHandler {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Handles one raw frame. Returns `None` when no response is owed
    /// (notifications and client-sent responses).
    pub async fn handle_frame(&mut self, frame: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(frame) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "unparseable frame");
                return Some(JsonRpcResponse::failure(Value::Null, JsonRpcError::parse_error(e)));
            }
        };

        if is_client_response(&value) {
            debug!("ignoring response frame from client");
            return None;
        }

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed request");
                return Some(JsonRpcResponse::failure(id, JsonRpcError::invalid_request(e)));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_request(format_args!(
                    "unsupported jsonrpc version '{}'",
                    request.jsonrpc
                )),
            ));
        }

        match request.id {
            None => {
                log_notification(&request.method);
                None
            }
            Some(id) => Some(self.handle_request(id, &request.method, request.params).await),
        }
    }

    async fn handle_request(&mut self, id: Value, method: &str, params: Option<Value>) -> JsonRpcResponse {
        match method {
            methods::INITIALIZE => {
                let params = match params.map(serde_json::from_value::<InitializeParams>).transpose() {
                    Ok(params) => params.unwrap_or_default(),
                    Err(e) => return JsonRpcResponse::failure(id, JsonRpcError::invalid_params(e)),
                };
                let protocol_version = negotiate_protocol_version(params.protocol_version.as_deref());
                info!(
                    protocol_version,
                    client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
                    "client initialized"
                );
                success(
                    id,
                    &InitializeResult {
                        protocol_version: protocol_version.to_string(),
                        capabilities: ServerCapabilities::default(),
                        server_info: Implementation {
                            name: SERVER_NAME.to_string(),
                            version: env!("CARGO_PKG_VERSION").to_string(),
                        },
                        instructions: None,
                    },
                )
            }
            methods::PING => JsonRpcResponse::success(id, json!({})),
            methods::TOOLS_LIST => success(
                id,
                &ListToolsResult {
                    tools: self.dispatcher.tools(),
                },
            ),
            methods::TOOLS_CALL => {
                let params = params.unwrap_or(Value::Null);
                let call: CallToolParams = match serde_json::from_value(params) {
                    Ok(call) => call,
                    Err(e) => return JsonRpcResponse::failure(id, JsonRpcError::invalid_params(e)),
                };
                let envelope = self.dispatcher.dispatch_value(&call.name, call.arguments).await;
                success(id, &CallToolResult::from(&envelope))
            }
            other => {
                warn!(method = other, "method not found");
                JsonRpcResponse::failure(id, JsonRpcError::method_not_found(other))
            }
        }
    }
}

fn log_notification(method: &str) {
    if method.starts_with(methods::NOTIFICATION_PREFIX) {
        debug!(method, "notification received");
    } else {
        debug!(method, "ignoring request sent without an id");
    }
}

/// A frame carrying `result` or `error` and no `method` is a response to us.
fn is_client_response(value: &Value) -> bool {
    value.get("method").is_none() && (value.get("result").is_some() || value.get("error").is_some())
}

fn success<T: Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(
            id,
            JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("serialization failed: {e}")),
        ),
    }
}

/// Response for a frame rejected before it could be parsed.
#[must_use]
pub fn oversized_frame_response(max_frame_bytes: usize) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        Value::Null,
        JsonRpcError::parse_error(format_args!("frame exceeds {max_frame_bytes} bytes")),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
