//! Connection configuration types.

use std::time::Duration;

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-state read timeout.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound (client) connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-state read timeout.
    pub read_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with default timeouts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-state read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Inbound (server) configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub host: String,
    /// Listen port. Port 0 binds an ephemeral port.
    pub port: u16,
    /// Per-state read timeout for each connection.
    pub read_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration with the default read timeout.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the per-state read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults() {
        let config = ClientConfig::new("relay.example", 2526);
        assert_eq!(config.host, "relay.example");
        assert_eq!(config.port, 2526);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
    }

    #[test]
    fn client_builder_chain() {
        let config = ClientConfig::new("relay.example", 2526)
            .connect_timeout(Duration::from_millis(500))
            .read_timeout(Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn server_defaults() {
        let config = ServerConfig::new("0.0.0.0", 2525);
        assert_eq!(config.port, 2525);
        assert_eq!(config.read_timeout, Duration::from_secs(30));
    }
}
