//! Configuration loading.
//!
//! Minimal TOML configuration for the daemon: the served domain, the
//! listen address, an optional TLS block driving the STARTTLS feature,
//! the legacy session toggle, idle timeout, and a static SASL user table.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Listener configuration.
    pub listen: ListenConfig,
    /// Optional TLS block; present enables STARTTLS.
    pub tls: Option<TlsConfig>,
    /// Legacy session feature toggle.
    #[serde(default)]
    pub session: SessionConfig,
    /// Connection timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Static SASL PLAIN user table: `username = "password"`. An empty
    /// table refuses every credential.
    #[serde(default)]
    pub users: HashMap<String, String>,
}

/// Server identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The XMPP domain this server answers for.
    pub domain: String,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g. "0.0.0.0:5222").
    pub address: SocketAddr,
}

/// TLS configuration for the STARTTLS upgrade.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to the certificate chain (PEM).
    pub cert_path: String,
    /// Path to the PKCS#8 private key (PEM).
    pub key_path: String,
    /// Whether STARTTLS must happen before any other negotiation. When
    /// set, the starttls feature replaces all others until the upgrade.
    #[serde(default)]
    pub required: bool,
}

/// Legacy session feature toggle.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Advertise `<session/>` in the feature list.
    #[serde(default = "default_true")]
    pub advertise: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig { advertise: true }
    }
}

/// Connection timeouts.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Idle seconds before a connection is treated as dead.
    #[serde(default = "default_idle_secs")]
    pub idle_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            idle_secs: default_idle_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_idle_secs() -> u64 {
    300
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            domain = "localhost"

            [listen]
            address = "127.0.0.1:5222"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.domain, "localhost");
        assert!(config.tls.is_none());
        assert!(config.session.advertise);
        assert_eq!(config.timeouts.idle_secs, 300);
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config: Config = toml::from_str(
            r#"
            [server]
            domain = "example.net"

            [listen]
            address = "0.0.0.0:5222"

            [tls]
            cert_path = "certs/server.pem"
            key_path = "certs/server.key"
            required = true

            [session]
            advertise = false

            [timeouts]
            idle_secs = 60

            [users]
            alice = "secret"
            "#,
        )
        .unwrap();
        let tls = config.tls.unwrap();
        assert!(tls.required);
        assert_eq!(tls.cert_path, "certs/server.pem");
        assert!(!config.session.advertise);
        assert_eq!(config.timeouts.idle_secs, 60);
        assert_eq!(config.users.get("alice").map(String::as_str), Some("secret"));
    }
}
