// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collector server configuration.

use crate::session::Credentials;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Collector server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// TCP port devices dial in to (default: 2200; 0 = ephemeral)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listen backlog for pending outbound connections
    #[serde(default = "default_listen_backlog")]
    pub listen_backlog: u32,

    /// Login user for the management session
    #[serde(default)]
    pub login_user: String,

    /// Login password for the management session
    #[serde(default)]
    pub login_password: String,

    /// Idle window for draining the device handshake (milliseconds)
    #[serde(default = "default_handshake_idle_timeout")]
    pub handshake_idle_timeout_ms: u64,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    2200
}

fn default_listen_backlog() -> u32 {
    10
}

fn default_handshake_idle_timeout() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            listen_backlog: default_listen_backlog(),
            login_user: String::new(),
            login_password: String::new(),
            handshake_idle_timeout_ms: default_handshake_idle_timeout(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// The socket address the acceptor binds.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Handshake idle window as a Duration.
    pub fn handshake_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_idle_timeout_ms)
    }

    /// Credentials handed to the session factory for each connection.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.login_user.clone(),
            password: self.login_password.clone(),
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.login_user.is_empty() {
            return Err(ConfigError::InvalidValue("login_user cannot be empty".into()));
        }
        if self.listen_backlog == 0 {
            return Err(ConfigError::InvalidValue(
                "listen_backlog cannot be 0".into(),
            ));
        }
        if self.handshake_idle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "handshake_idle_timeout_ms cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            login_user: "collector".into(),
            login_password: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 2200);
        assert_eq!(config.listen_backlog, 10);
        assert_eq!(config.handshake_idle_timeout_ms, 1000);
        assert!(config.login_user.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid_config();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: ServerConfig = serde_json::from_str(&json).expect("parse");
        assert_eq!(config.port, parsed.port);
        assert_eq!(config.login_user, parsed.login_user);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: ServerConfig =
            serde_json::from_str(r#"{ "login_user": "admin" }"#).expect("parse");
        assert_eq!(parsed.login_user, "admin");
        assert_eq!(parsed.port, 2200);
        assert_eq!(parsed.listen_backlog, 10);
    }

    #[test]
    fn test_validation_empty_user() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_backlog() {
        let config = ServerConfig {
            listen_backlog: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_ephemeral_port_ok() {
        let config = ServerConfig {
            port: 0,
            ..valid_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_handshake_idle_timeout() {
        let config = ServerConfig {
            handshake_idle_timeout_ms: 250,
            ..valid_config()
        };
        assert_eq!(config.handshake_idle_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("collector.json");

        let config = valid_config();
        config.to_file(&path).expect("write");
        let loaded = ServerConfig::from_file(&path).expect("read");
        assert_eq!(loaded.login_user, config.login_user);
        assert_eq!(loaded.port, config.port);
    }
}
