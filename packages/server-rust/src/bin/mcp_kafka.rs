//! `mcp-kafka` entry point: parse configuration, install logging, serve stdio.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mcp_kafka_core::ToolRegistry;
use mcp_kafka_server::cli::Cli;
use mcp_kafka_server::gateway::{BrokerConnector, BrokerGateway, MemoryBroker};
use mcp_kafka_server::logging;
use mcp_kafka_server::network::{McpHandler, ShutdownController, StdioTransport};
use mcp_kafka_server::service::{Dispatcher, ServerConfig};
use tracing::{error, info, warn};

/// How long runtime teardown waits on the blocking stdin reader.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level, cli.log_file.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run(cli));
    // A pending stdin read cannot be cancelled, so do not wait on it.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    if let Err(e) = &result {
        error!("server exited with an error: {e:#}");
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let broker_config = cli
        .broker_config()
        .context("invalid Kafka connection settings")?;
    let server_config = Arc::new(cli.server_config());
    let connector = connector(&cli, &server_config)?;

    info!(
        bootstrap = %broker_config.bootstrap_servers(),
        security_protocol = %broker_config.security_protocol(),
        sasl_mechanism = broker_config.sasl().map(|s| s.mechanism.as_str()),
        in_memory = cli.in_memory_broker,
        "starting mcp-kafka"
    );

    let gateway = BrokerGateway::new(connector, Arc::new(broker_config));
    let shutdown = Arc::new(ShutdownController::new(gateway.releases().clone()));
    let dispatcher = Dispatcher::new(
        Arc::new(ToolRegistry::standard()),
        gateway,
        Arc::clone(&server_config),
    );
    let transport = StdioTransport::new(
        McpHandler::new(dispatcher),
        Arc::clone(&shutdown),
        server_config.max_frame_bytes,
    );

    let signal_shutdown = Arc::clone(&shutdown);
    let signals = tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(()) => {
                info!("Server stopped by user.");
                signal_shutdown.trigger_shutdown();
            }
            Err(e) => error!(error = %e, "failed to install signal handlers"),
        }
    });

    let result = transport.serve_stdio().await;
    signals.abort();
    result.context("stdio transport failed")
}

fn connector(cli: &Cli, config: &ServerConfig) -> anyhow::Result<Arc<dyn BrokerConnector>> {
    if cli.in_memory_broker {
        warn!("using the in-memory broker; nothing is sent to Kafka");
        return Ok(Arc::new(MemoryBroker::new()));
    }
    kafka_connector(config)
}

#[cfg(feature = "kafka")]
#[allow(clippy::unnecessary_wraps)]
fn kafka_connector(config: &ServerConfig) -> anyhow::Result<Arc<dyn BrokerConnector>> {
    use mcp_kafka_server::gateway::kafka::KafkaConnector;

    Ok(Arc::new(KafkaConnector::new(
        config.connect_timeout(),
        config.publish_ack_timeout(),
    )))
}

#[cfg(not(feature = "kafka"))]
fn kafka_connector(_config: &ServerConfig) -> anyhow::Result<Arc<dyn BrokerConnector>> {
    anyhow::bail!(
        "this binary was built without the `kafka` feature; rebuild with `--features kafka` \
         or pass --in-memory-broker"
    )
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
