use std::fmt;
use std::str::FromStr;

use vbiasctl_transport::DEFAULT_RELAY_PORT;

use crate::config::DEFAULT_INTERFACE;
use crate::error::RelayError;

/// Where a board lives: `[host[:port]::]interface`.
///
/// Without a host the interface is driven directly; with one, requests go
/// through the relay daemon on that host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: Option<String>,
    pub port: u16,
    pub interface: String,
}

impl Destination {
    /// Direct access to a local interface.
    pub fn local(interface: impl Into<String>) -> Self {
        Self {
            host: None,
            port: DEFAULT_RELAY_PORT,
            interface: interface.into(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    /// `host:port` of the relay daemon, for remote destinations.
    pub fn server(&self) -> Option<String> {
        self.host.as_ref().map(|host| format!("{host}:{}", self.port))
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::local(DEFAULT_INTERFACE)
    }
}

impl FromStr for Destination {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RelayError::InvalidDestination(s.to_string());
        let s = s.trim();
        let Some((server, interface)) = s.split_once("::") else {
            if s.contains(':') {
                return Err(invalid());
            }
            let interface = if s.is_empty() { DEFAULT_INTERFACE } else { s };
            return Ok(Self::local(interface));
        };

        let interface = if interface.is_empty() {
            DEFAULT_INTERFACE
        } else {
            interface
        };
        if interface.contains(':') {
            return Err(invalid());
        }
        let (host, port) = match server.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (server, DEFAULT_RELAY_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: Some(host.to_string()),
            port,
            interface: interface.to_string(),
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{host}:{}::{}", self.port, self.interface),
            None => f.write_str(&self.interface),
        }
    }
}
