//! Broker connection configuration and topic metadata types.
//!
//! [`BrokerConnectionConfig`] is built once at startup and shared read-only by
//! every gateway acquisition. Its constructor enforces the SASL invariant, so
//! an invalid combination is a startup error and never a dispatch error.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Invalid broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one bootstrap server is required")]
    EmptyBootstrap,
    #[error("bootstrap server '{0}' is not of the form host:port")]
    InvalidAddress(String),
    #[error("unknown security protocol '{0}' (expected PLAINTEXT, SSL, SASL_PLAINTEXT or SASL_SSL)")]
    UnknownSecurityProtocol(String),
    #[error("unknown SASL mechanism '{0}' (expected PLAIN, SCRAM-SHA-256 or SCRAM-SHA-512)")]
    UnknownSaslMechanism(String),
    #[error("SASL mechanism {mechanism} requires a SASL security protocol, got {protocol}")]
    MechanismWithoutSaslProtocol {
        mechanism: SaslMechanism,
        protocol: SecurityProtocol,
    },
    #[error("security protocol {0} requires a SASL mechanism")]
    SaslProtocolWithoutMechanism(SecurityProtocol),
    #[error("SASL mechanism {0} requires both a username and a password")]
    MissingCredentials(SaslMechanism),
}

// ---------------------------------------------------------------------------
// Protocol and mechanism
// ---------------------------------------------------------------------------

/// Transport security used to reach the brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaintext => "PLAINTEXT",
            Self::Ssl => "SSL",
            Self::SaslPlaintext => "SASL_PLAINTEXT",
            Self::SaslSsl => "SASL_SSL",
        }
    }

    /// Whether this protocol authenticates with SASL.
    #[must_use]
    pub fn is_sasl(self) -> bool {
        matches!(self, Self::SaslPlaintext | Self::SaslSsl)
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAINTEXT" => Ok(Self::Plaintext),
            "SSL" => Ok(Self::Ssl),
            "SASL_PLAINTEXT" => Ok(Self::SaslPlaintext),
            "SASL_SSL" => Ok(Self::SaslSsl),
            _ => Err(ConfigError::UnknownSecurityProtocol(s.to_string())),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::ScramSha256 => "SCRAM-SHA-256",
            Self::ScramSha512 => "SCRAM-SHA-512",
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SaslMechanism {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            _ => Err(ConfigError::UnknownSaslMechanism(s.to_string())),
        }
    }
}

/// Username/password pair. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    username: String,
    password: String,
}

impl SaslCredentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SASL mechanism with the credentials it authenticates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaslSettings {
    pub mechanism: SaslMechanism,
    pub credentials: SaslCredentials,
}

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// One `host:port` bootstrap entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for BrokerAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let invalid = || ConfigError::InvalidAddress(entry.to_string());
        let (host, port) = entry.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

// ---------------------------------------------------------------------------
// BrokerConnectionConfig
// ---------------------------------------------------------------------------

/// Validated settings for reaching the broker cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConnectionConfig {
    bootstrap: Vec<BrokerAddress>,
    security_protocol: SecurityProtocol,
    sasl: Option<SaslSettings>,
}

impl BrokerConnectionConfig {
    /// Builds a config, enforcing the SASL invariant.
    ///
    /// Credentials supplied without a mechanism are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty bootstrap list, a mechanism paired
    /// with a non-SASL protocol, a SASL protocol without a mechanism, or a
    /// mechanism without both username and password.
    pub fn new(
        bootstrap: Vec<BrokerAddress>,
        security_protocol: SecurityProtocol,
        sasl_mechanism: Option<SaslMechanism>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        if bootstrap.is_empty() {
            return Err(ConfigError::EmptyBootstrap);
        }
        let sasl = match (sasl_mechanism, security_protocol.is_sasl()) {
            (Some(mechanism), false) => {
                return Err(ConfigError::MechanismWithoutSaslProtocol {
                    mechanism,
                    protocol: security_protocol,
                });
            }
            (None, true) => {
                return Err(ConfigError::SaslProtocolWithoutMechanism(security_protocol));
            }
            (None, false) => None,
            (Some(mechanism), true) => match (username, password) {
                (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                    Some(SaslSettings {
                        mechanism,
                        credentials: SaslCredentials::new(user, pass),
                    })
                }
                _ => return Err(ConfigError::MissingCredentials(mechanism)),
            },
        };
        Ok(Self {
            bootstrap,
            security_protocol,
            sasl,
        })
    }

    /// Plaintext config for the given addresses.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EmptyBootstrap` if `bootstrap` is empty.
    pub fn plaintext(bootstrap: Vec<BrokerAddress>) -> Result<Self, ConfigError> {
        Self::new(bootstrap, SecurityProtocol::Plaintext, None, None, None)
    }

    /// Parses a comma-separated `host:port` list. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddress` for the first malformed entry, or
    /// `ConfigError::EmptyBootstrap` if no entries remain.
    pub fn parse_bootstrap(list: &str) -> Result<Vec<BrokerAddress>, ConfigError> {
        let addresses = list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<BrokerAddress>, _>>()?;
        if addresses.is_empty() {
            return Err(ConfigError::EmptyBootstrap);
        }
        Ok(addresses)
    }

    #[must_use]
    pub fn bootstrap(&self) -> &[BrokerAddress] {
        &self.bootstrap
    }

    /// Bootstrap list in the comma-joined form client libraries expect.
    #[must_use]
    pub fn bootstrap_servers(&self) -> String {
        self.bootstrap
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    #[must_use]
    pub fn security_protocol(&self) -> SecurityProtocol {
        self.security_protocol
    }

    #[must_use]
    pub fn sasl(&self) -> Option<&SaslSettings> {
        self.sasl.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Topic metadata
// ---------------------------------------------------------------------------

/// Placement of one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub partition_id: i32,
    /// Broker id of the leader, or -1 when no leader is elected.
    pub leader: i32,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

/// Metadata and configuration of one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub topic_name: String,
    pub is_internal: bool,
    pub partitions: Vec<PartitionInfo>,
    pub configuration: BTreeMap<String, String>,
}

/// Parameters of a topic creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopicSpec {
    pub name: String,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub config: BTreeMap<String, String>,
}

/// Where an acknowledged message landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub partition: i32,
    pub offset: i64,
}
