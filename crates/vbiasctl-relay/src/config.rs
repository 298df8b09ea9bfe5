use std::time::Duration;

use serde::{Deserialize, Serialize};
use vbiasctl_board::{ProbeConfig, SessionConfig};
use vbiasctl_transport::DEFAULT_RELAY_PORT;

/// Interface used when a request or destination names none.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Settings of the relay daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// TCP port to listen on. Default: 5692.
    pub port: u16,
    /// Interface for `select`, `probe` and `get_hostMACaddr` without one.
    pub default_interface: String,
    /// How often the accept loop checks for shutdown. Default: 100 ms.
    pub poll_interval: Duration,
    pub session: SessionConfig,
    pub probe: ProbeConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_RELAY_PORT,
            default_interface: DEFAULT_INTERFACE.to_string(),
            poll_interval: Duration::from_millis(100),
            session: SessionConfig::default(),
            probe: ProbeConfig::default(),
        }
    }
}

impl RelayConfig {
    /// `interface`, or the configured default when absent.
    pub fn interface_or_default<'a>(&'a self, interface: Option<&'a str>) -> &'a str {
        interface.unwrap_or(&self.default_interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 5692);
        assert_eq!(config.interface_or_default(None), "eth0");
        assert_eq!(config.interface_or_default(Some("eth1")), "eth1");
    }

    #[test]
    fn serializes_for_diagnostics() {
        let json = serde_json::to_value(RelayConfig::default()).expect("config should serialize");
        assert_eq!(json["port"], 5692);
        assert_eq!(json["default_interface"], "eth0");
    }
}
