//! Server configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use rv_protocol::MuxConfig;

use super::serde_utils::{duration_millis, duration_secs};
use crate::control::ControlEndpoint;
use crate::error::ConfigError;

/// Top-level layout of `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerConfig,
}

/// How agent connections are carried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain TCP
    #[default]
    Plain,
    /// TLS with a self-signed certificate generated at startup
    Tls,
    /// Plain TCP behind an externally managed onion service
    Tor,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Plain => write!(f, "plain"),
            Transport::Tls => write!(f, "tls"),
            Transport::Tor => write!(f, "tor"),
        }
    }
}

/// Configuration for the tunnel server daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port agents dial into
    pub port: u16,

    /// Host the agent listener binds to
    pub bind_host: String,

    /// Transport used for agent connections
    pub transport: Transport,

    /// Host the per-agent bridge listeners bind to
    pub bridge_host: String,

    /// Control-plane endpoint
    pub control: ControlEndpoint,

    /// Interval between liveness probes
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,

    /// Consecutive failed probes that tear a tunnel down
    pub health_failure_threshold: u32,

    /// How long a single liveness probe may take
    #[serde(with = "duration_secs")]
    pub ping_timeout: Duration,

    /// Bridged clients one agent may carry at once
    pub max_streams: usize,

    /// Deadline for TLS accept plus preamble read
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// Delay between answering a shutdown request and draining
    #[serde(rename = "shutdown_grace_ms", with = "duration_millis")]
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1080,
            bind_host: "0.0.0.0".to_string(),
            transport: Transport::Plain,
            bridge_host: "127.0.0.1".to_string(),
            control: ControlEndpoint::default(),
            health_interval: Duration::from_secs(5),
            health_failure_threshold: 1,
            ping_timeout: Duration::from_secs(10),
            max_streams: 512,
            handshake_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_millis(500),
        }
    }
}

impl ServerConfig {
    /// Address of the agent listener (host:port)
    pub fn agent_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Multiplexer settings derived from this config
    pub fn mux_config(&self) -> MuxConfig {
        MuxConfig {
            ping_timeout: self.ping_timeout,
            max_streams: self.max_streams,
            ..MuxConfig::default()
        }
    }

    /// Check for values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "health_interval must be greater than zero".into(),
            ));
        }
        if self.health_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "health_failure_threshold must be at least 1".into(),
            ));
        }
        if self.ping_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "ping_timeout must be greater than zero".into(),
            ));
        }
        if self.max_streams == 0 {
            return Err(ConfigError::Invalid(
                "max_streams must be greater than zero".into(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "handshake_timeout must be greater than zero".into(),
            ));
        }
        self.control.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.agent_address(), "0.0.0.0:1080");
        assert_eq!(config.health_interval, Duration::from_secs(5));
        assert_eq!(config.health_failure_threshold, 1);
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = ServerConfig {
            health_failure_threshold: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = ServerConfig {
            health_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mux_config_carries_ping_timeout() {
        let config = ServerConfig {
            ping_timeout: Duration::from_secs(3),
            ..Default::default()
        };
        assert_eq!(config.mux_config().ping_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_stream_limit_reaches_mux_config() {
        let config = ServerConfig {
            max_streams: 2,
            ..Default::default()
        };
        assert_eq!(config.mux_config().max_streams, 2);

        let zero = ServerConfig {
            max_streams: 0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_toml_field_names() {
        let toml = toml::to_string(&ConfigFile::default()).unwrap();
        assert!(toml.contains("[server]"));
        assert!(toml.contains("shutdown_grace_ms = 500"));
        assert!(toml.contains("transport = \"plain\""));
    }
}
