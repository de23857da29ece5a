use crate::{env_or_default, ConfigError, FromEnv};
use std::net::Ipv4Addr;

/// Listener configuration for the health and metrics server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read the port from the first set variable in `port_keys`, else `default_port`.
    pub fn from_env_with(port_keys: &[&str], default_port: u16) -> Result<Self, ConfigError> {
        let host = env_or_default("HEALTH_HOST", &Ipv4Addr::UNSPECIFIED.to_string());

        let port = match port_keys
            .iter()
            .find_map(|key| std::env::var(key).ok().map(|v| (*key, v)))
        {
            Some((key, raw)) => raw.trim().parse().map_err(|e| ConfigError::ParseError {
                key: key.to_string(),
                details: format!("{}", e),
            })?,
            None => default_port,
        };

        Ok(Self::new(host, port))
    }
}

impl FromEnv for ServerConfig {
    /// Reads `HEALTH_HOST` (default 0.0.0.0) and `HEALTH_PORT` (default 8080).
    fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(&["HEALTH_PORT"], 8080)
    }
}
