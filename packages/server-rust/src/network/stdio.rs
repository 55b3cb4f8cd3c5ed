//! Stdio transport: newline-delimited JSON-RPC frames on stdin/stdout.
//!
//! Frames are handled strictly one at a time. Shutdown is only observed
//! between frames, so a call that has started always finishes and its
//! response is written before the loop exits.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mcp_kafka_core::messages::JsonRpcResponse;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use super::codec::{Frame, FrameCodec};
use super::protocol::{oversized_frame_response, McpHandler};
use super::shutdown::ShutdownController;

/// Bound on waiting for background handle closes after the loop stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal transport failures. Frame-level errors are answered, not raised.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to read from stdin")]
    Read(#[source] io::Error),
    #[error("failed to write to stdout")]
    Write(#[source] io::Error),
    #[error("failed to encode response")]
    Encode(#[from] serde_json::Error),
}

pub struct StdioTransport {
    handler: McpHandler,
    shutdown: Arc<ShutdownController>,
    max_frame_bytes: usize,
}

impl StdioTransport {
    #[must_use]
    pub fn new(handler: McpHandler, shutdown: Arc<ShutdownController>, max_frame_bytes: usize) -> Self {
        Self {
            handler,
            shutdown,
            max_frame_bytes,
        }
    }

    /// Serves the process's own stdin and stdout.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if stdin or stdout fails.
    pub async fn serve_stdio(self) -> Result<(), TransportError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Reads frames from `reader` and writes responses to `writer` until EOF,
    /// shutdown, or an I/O failure.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if reading, encoding or writing fails.
    pub async fn serve<R, W>(mut self, reader: R, writer: W) -> Result<(), TransportError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut frames = FramedRead::new(reader, FrameCodec::new(self.max_frame_bytes));
        let mut out = FramedWrite::new(writer, FrameCodec::new(self.max_frame_bytes));
        let mut shutdown_rx = self.shutdown.shutdown_receiver();

        self.shutdown.set_ready();
        info!(max_frame_bytes = self.max_frame_bytes, "stdio transport ready");

        let result = loop {
            let next = tokio::select! {
                biased;
                () = shutdown_requested(&mut shutdown_rx) => {
                    info!("shutdown requested, no longer reading stdin");
                    break Ok(());
                }
                next = frames.next() => next,
            };

            let frame = match next {
                None => {
                    info!("stdin closed");
                    break Ok(());
                }
                Some(Err(e)) => break Err(TransportError::Read(e)),
                Some(Ok(frame)) => frame,
            };

            let response = match frame {
                Frame::Oversized => {
                    warn!(max_frame_bytes = self.max_frame_bytes, "frame too long, discarded");
                    Some(oversized_frame_response(self.max_frame_bytes))
                }
                Frame::Line(line) if line.trim().is_empty() => None,
                Frame::Line(line) => self.handler.handle_frame(&line).await,
            };

            if let Some(response) = response {
                if let Err(e) = write_response(&mut out, &response).await {
                    break Err(e);
                }
            }
        };

        self.shutdown.trigger_shutdown();
        if !self.shutdown.wait_for_drain(DRAIN_TIMEOUT).await {
            warn!(
                pending = self.shutdown.pending_releases(),
                "Kafka clients still closing at shutdown"
            );
        }
        info!("stdio transport stopped");
        result
    }
}

async fn write_response<W>(
    out: &mut FramedWrite<W, FrameCodec>,
    response: &JsonRpcResponse,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let text = serde_json::to_string(response)?;
    debug!(bytes = text.len(), "writing response");
    out.send(text).await.map_err(TransportError::Write)
}

/// Resolves once shutdown has been triggered, including before this call.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Controller dropped without triggering; never resolve.
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mcp_kafka_core::{BrokerConnectionConfig, ToolRegistry};
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::gateway::{BrokerGateway, Faults, MemoryBroker};
    use crate::network::shutdown::HealthState;
    use crate::service::{Dispatcher, OperationError, ServerConfig};

    fn gateway(broker: &MemoryBroker) -> BrokerGateway {
        let config = BrokerConnectionConfig::plaintext(
            BrokerConnectionConfig::parse_bootstrap("localhost:9092").unwrap(),
        )
        .unwrap();
        BrokerGateway::new(Arc::new(broker.clone()), Arc::new(config))
    }

    fn transport_over(
        gateway: BrokerGateway,
        shutdown: &Arc<ShutdownController>,
        max_frame_bytes: usize,
    ) -> StdioTransport {
        let dispatcher = Dispatcher::new(
            Arc::new(ToolRegistry::standard()),
            gateway,
            Arc::new(ServerConfig::default()),
        );
        StdioTransport::new(McpHandler::new(dispatcher), Arc::clone(shutdown), max_frame_bytes)
    }

    fn transport(shutdown: &Arc<ShutdownController>, max_frame_bytes: usize) -> StdioTransport {
        transport_over(gateway(&MemoryBroker::new()), shutdown, max_frame_bytes)
    }

    #[tokio::test]
    async fn eof_stops_loop_and_marks_stopped() {
        let shutdown = Arc::new(ShutdownController::default());
        let (mut client, server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);

        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        transport(&shutdown, 1024)
            .serve(read_half, write_half)
            .await
            .unwrap();
        assert_eq!(shutdown.health_state(), HealthState::Stopped);

        let mut lines = BufReader::new(client).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let resp: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn oversized_frame_answered_and_loop_continues() {
        let shutdown = Arc::new(ShutdownController::default());
        let (mut client, server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);

        let long = format!("{{\"pad\":\"{}\"}}\n", "x".repeat(200));
        client.write_all(long.as_bytes()).await.unwrap();
        client
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        transport(&shutdown, 64).serve(read_half, write_half).await.unwrap();

        let mut lines = BufReader::new(client).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["error"]["code"], -32700);
        assert_eq!(first["id"], Value::Null);
        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["id"], 2);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_reading() {
        let shutdown = Arc::new(ShutdownController::default());
        let (_client, server) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(server);

        let task = tokio::spawn(transport(&shutdown, 1024).serve(read_half, write_half));
        tokio::task::yield_now().await;
        shutdown.trigger_shutdown();

        task.await.unwrap().unwrap();
        assert_eq!(shutdown.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn stop_waits_for_background_closes() {
        let broker = MemoryBroker::new();
        broker.set_faults(Faults {
            stall_acks: true,
            ..Faults::default()
        });
        let gateway = gateway(&broker);
        let shutdown = Arc::new(ShutdownController::new(gateway.releases().clone()));

        let stalled = gateway.with_producer_scope(|producer| {
            Box::pin(async move {
                producer
                    .publish("orders", b"m", None, Duration::from_secs(30))
                    .await
                    .map_err(|e| OperationError::Internal(e.into()))
            })
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), stalled).await.is_err());
        assert_eq!(shutdown.pending_releases(), 1);

        let (client, server) = tokio::io::duplex(4096);
        drop(client);
        let (read_half, write_half) = tokio::io::split(server);
        transport_over(gateway, &shutdown, 1024)
            .serve(read_half, write_half)
            .await
            .unwrap();

        assert_eq!(shutdown.health_state(), HealthState::Stopped);
        assert_eq!(shutdown.pending_releases(), 0);
        assert_eq!(broker.stats().producers_closed, 1);
    }
}
