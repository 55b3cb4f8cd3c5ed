use std::time::Duration;

use mcp_kafka_core::ToolKind;

/// Server-level configuration for the operation pipeline and transport.
///
/// Controls operation timeouts, broker acknowledgement bounds, and framing limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pipeline timeout for operations without an acknowledgement bound, in milliseconds.
    pub default_operation_timeout_ms: u64,
    /// How long `create_topic` / `delete_topic` wait for the broker to acknowledge.
    pub admin_ack_timeout_ms: u64,
    /// How long `publish_message` waits for the delivery acknowledgement.
    pub publish_ack_timeout_ms: u64,
    /// Extra pipeline time granted to acknowledged operations for connect and teardown.
    pub ack_timeout_grace_ms: u64,
    /// Bound on the connectivity check performed when a handle is opened.
    pub connect_timeout_ms: u64,
    /// Longest accepted stdin frame, in bytes.
    pub max_frame_bytes: usize,
}

impl ServerConfig {
    #[must_use]
    pub fn admin_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_ack_timeout_ms)
    }

    #[must_use]
    pub fn publish_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_ack_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Pipeline timeout applied to a call of `tool`.
    ///
    /// Acknowledged operations get their ack bound plus the grace, so the
    /// backend reports its own timeout before the pipeline cuts it off.
    #[must_use]
    pub fn timeout_for(&self, tool: ToolKind) -> u64 {
        if !tool.awaits_ack() {
            return self.default_operation_timeout_ms;
        }
        let ack_bound = if tool == ToolKind::PublishMessage {
            self.publish_ack_timeout_ms
        } else {
            self.admin_ack_timeout_ms
        };
        ack_bound.saturating_add(self.ack_timeout_grace_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_operation_timeout_ms: 60_000,
            admin_ack_timeout_ms: 30_000,
            publish_ack_timeout_ms: 30_000,
            ack_timeout_grace_ms: 5_000,
            connect_timeout_ms: 10_000,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledged_operations_get_ack_bound_plus_grace() {
        let config = ServerConfig::default();
        assert_eq!(config.timeout_for(ToolKind::DeleteTopic), 35_000);
        assert_eq!(config.timeout_for(ToolKind::CreateTopic), 35_000);
        assert_eq!(config.timeout_for(ToolKind::ListTopics), 60_000);
        assert_eq!(config.timeout_for(ToolKind::GetTopicInfo), 60_000);
        assert_eq!(config.admin_ack_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn publish_gets_its_own_ack_bound_plus_grace() {
        let config = ServerConfig {
            publish_ack_timeout_ms: 10_000,
            ..ServerConfig::default()
        };
        assert_eq!(config.timeout_for(ToolKind::PublishMessage), 15_000);
        assert!(config.publish_ack_timeout() < Duration::from_millis(config.timeout_for(ToolKind::PublishMessage)));
    }
}
