//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::Parser;
use mcp_kafka_core::{BrokerConnectionConfig, ConfigError, SaslMechanism, SecurityProtocol};

use crate::logging::LogLevel;
use crate::service::ServerConfig;

/// Bootstrap address assumed by the in-memory broker when none is given.
pub const IN_MEMORY_BOOTSTRAP: &str = "localhost:9092";

// No `Debug`: holds the SASL password.

/// Kafka operations exposed as MCP tools over stdio.
#[derive(Parser)]
#[command(name = "mcp-kafka", version, about)]
pub struct Cli {
    /// Comma-separated host:port list of Kafka brokers.
    #[arg(
        long,
        env = "KAFKA_BOOTSTRAP_SERVERS",
        required_unless_present = "in_memory_broker"
    )]
    pub kafka_bootstrap_servers: Option<String>,

    /// PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL.
    #[arg(long, env = "KAFKA_SECURITY_PROTOCOL", default_value = "PLAINTEXT")]
    pub kafka_security_protocol: String,

    /// PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512.
    #[arg(long, env = "KAFKA_SASL_MECHANISM")]
    pub kafka_sasl_mechanism: Option<String>,

    #[arg(long, env = "KAFKA_SASL_PLAIN_USERNAME")]
    pub kafka_sasl_plain_username: Option<String>,

    #[arg(long, env = "KAFKA_SASL_PLAIN_PASSWORD", hide_env_values = true)]
    pub kafka_sasl_plain_password: Option<String>,

    #[arg(
        long,
        env = "MCP_KAFKA_LOG_LEVEL",
        value_enum,
        ignore_case = true,
        default_value_t = LogLevel::Info
    )]
    pub log_level: LogLevel,

    /// Also append logs to this file.
    #[arg(long, env = "MCP_KAFKA_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Pipeline bound for calls that do not wait on a broker acknowledgement.
    #[arg(long, env = "MCP_KAFKA_OPERATION_TIMEOUT_MS", default_value_t = 60_000)]
    pub operation_timeout_ms: u64,

    /// How long topic creation and deletion wait for the broker.
    #[arg(long, env = "MCP_KAFKA_ADMIN_ACK_TIMEOUT_MS", default_value_t = 30_000)]
    pub admin_ack_timeout_ms: u64,

    /// How long a publish waits for the delivery acknowledgement.
    #[arg(long, env = "MCP_KAFKA_PUBLISH_ACK_TIMEOUT_MS", default_value_t = 30_000)]
    pub publish_ack_timeout_ms: u64,

    #[arg(long, env = "MCP_KAFKA_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub connect_timeout_ms: u64,

    /// Longest accepted input line, in bytes.
    #[arg(long, env = "MCP_KAFKA_MAX_FRAME_BYTES", default_value_t = 4 * 1024 * 1024)]
    pub max_frame_bytes: usize,

    /// Serve from a process-local broker instead of a Kafka cluster.
    #[arg(long, env = "MCP_KAFKA_IN_MEMORY_BROKER")]
    pub in_memory_broker: bool,
}

impl Cli {
    /// Validates the broker settings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found in the bootstrap list,
    /// protocol, mechanism, or credentials.
    pub fn broker_config(&self) -> Result<BrokerConnectionConfig, ConfigError> {
        let bootstrap = match (&self.kafka_bootstrap_servers, self.in_memory_broker) {
            (Some(list), _) => list.as_str(),
            (None, true) => IN_MEMORY_BOOTSTRAP,
            (None, false) => return Err(ConfigError::EmptyBootstrap),
        };
        let bootstrap = BrokerConnectionConfig::parse_bootstrap(bootstrap)?;
        let protocol: SecurityProtocol = self.kafka_security_protocol.parse()?;
        let mechanism = self
            .kafka_sasl_mechanism
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(str::parse::<SaslMechanism>)
            .transpose()?;

        BrokerConnectionConfig::new(
            bootstrap,
            protocol,
            mechanism,
            self.kafka_sasl_plain_username.clone(),
            self.kafka_sasl_plain_password.clone(),
        )
    }

    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            default_operation_timeout_ms: self.operation_timeout_ms,
            admin_ack_timeout_ms: self.admin_ack_timeout_ms,
            publish_ack_timeout_ms: self.publish_ack_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            max_frame_bytes: self.max_frame_bytes,
            ..ServerConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mcp-kafka").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn plaintext_defaults() {
        let cli = parse(&["--kafka-bootstrap-servers", "a:9092,b:9093"]);
        let config = cli.broker_config().unwrap();
        assert_eq!(config.bootstrap_servers(), "a:9092,b:9093");
        assert_eq!(config.security_protocol(), SecurityProtocol::Plaintext);
        assert!(config.sasl().is_none());
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.server_config().timeout_for(mcp_kafka_core::ToolKind::CreateTopic), 35_000);
    }

    #[test]
    fn sasl_requires_credentials() {
        let cli = parse(&[
            "--kafka-bootstrap-servers",
            "a:9092",
            "--kafka-security-protocol",
            "SASL_SSL",
            "--kafka-sasl-mechanism",
            "PLAIN",
            "--kafka-sasl-plain-username",
            "alice",
        ]);
        assert!(matches!(
            cli.broker_config(),
            Err(ConfigError::MissingCredentials(SaslMechanism::Plain))
        ));
    }

    #[test]
    fn mechanism_with_plaintext_rejected() {
        let cli = parse(&[
            "--kafka-bootstrap-servers",
            "a:9092",
            "--kafka-sasl-mechanism",
            "SCRAM-SHA-256",
        ]);
        assert!(matches!(
            cli.broker_config(),
            Err(ConfigError::MechanismWithoutSaslProtocol { .. })
        ));
    }

    #[test]
    fn bad_port_rejected() {
        let cli = parse(&["--kafka-bootstrap-servers", "a:notaport"]);
        assert!(matches!(cli.broker_config(), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn bootstrap_required_unless_in_memory() {
        assert!(Cli::try_parse_from(["mcp-kafka"]).is_err());
        let cli = parse(&["--in-memory-broker", "--log-level", "warning"]);
        assert_eq!(cli.log_level, LogLevel::Warning);
        assert_eq!(cli.broker_config().unwrap().bootstrap_servers(), IN_MEMORY_BOOTSTRAP);
    }

    #[test]
    fn timeouts_override_server_config() {
        let cli = parse(&[
            "--in-memory-broker",
            "--admin-ack-timeout-ms",
            "1000",
            "--publish-ack-timeout-ms",
            "2000",
            "--max-frame-bytes",
            "512",
        ]);
        let config = cli.server_config();
        assert_eq!(config.admin_ack_timeout_ms, 1000);
        assert_eq!(config.timeout_for(mcp_kafka_core::ToolKind::PublishMessage), 7_000);
        assert_eq!(config.max_frame_bytes, 512);
        assert_eq!(config.default_operation_timeout_ms, 60_000);
    }
}
