//! Client configuration.
//!
//! All tunables live in one explicit [`ClientConfig`] value handed to the
//! builder at construction time. There is no environment or process-global
//! configuration; tests construct their own configs and stay deterministic.

use std::path::PathBuf;
use std::time::Duration;

/// Default client name sent in the registration request.
pub const DEFAULT_CLIENT_NAME: &str = "vapi-rs";

/// Default bound on waiting for the registration reply.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on waiting for the read loop to exit during disconnect.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default bound on waiting for the socket file to appear.
pub const DEFAULT_SOCKET_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket path override. `None` selects the default path and allows the
    /// legacy-path fallback; an explicit path is used verbatim.
    pub socket_path: Option<PathBuf>,
    /// Client name sent in the registration request.
    pub client_name: String,
    /// How long to wait for the registration reply.
    pub connect_timeout: Duration,
    /// How long disconnect waits for the read loop before force-closing.
    pub disconnect_timeout: Duration,
    /// How long to wait for the socket file to be created.
    pub socket_wait_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            socket_wait_timeout: DEFAULT_SOCKET_WAIT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::default();
        assert!(config.socket_path.is_none());
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.disconnect_timeout, Duration::from_millis(100));
        assert_eq!(config.socket_wait_timeout, Duration::from_secs(10));
    }
}
