//! Environment-driven configuration for the hub and the server.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors, surfaced at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: '{value}' (expected {expected})")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

impl ConfigError {
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

/// Default values for [`HubConfig`].
pub struct HubDefaults;

impl HubDefaults {
    /// How long a caller waits for the control loop to accept an operation.
    pub const SUBMISSION_TIMEOUT_MS: u64 = 5_000;
    /// Upper bound on one send attempt to one peer during a broadcast.
    pub const SEND_TIMEOUT_MS: u64 = 1_000;
    /// Outbound frame buffer per connection.
    pub const OUTBOUND_BUFFER: usize = 64;
}

/// Default values for [`ServerConfig`].
pub struct ServerDefaults;

impl ServerDefaults {
    pub const HOST: &'static str = "0.0.0.0";
    pub const PORT: u16 = 3000;
    pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
}

/// Tuning knobs for the broadcast hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Submission timeout in milliseconds. A caller whose operation is not
    /// accepted within this window gets `HubError::SubmissionTimeout` instead
    /// of blocking forever on a stalled control loop.
    pub submission_timeout_ms: u64,
    /// Per-send timeout in milliseconds. Bounds how long one slow peer can
    /// delay delivery to peers iterated after it in the same broadcast.
    pub send_timeout_ms: u64,
    /// Capacity of each connection's outbound frame buffer.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            submission_timeout_ms: HubDefaults::SUBMISSION_TIMEOUT_MS,
            send_timeout_ms: HubDefaults::SEND_TIMEOUT_MS,
            outbound_buffer: HubDefaults::OUTBOUND_BUFFER,
        }
    }
}

impl HubConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let submission_timeout_ms = get_env_or_default(
            "HUB_SUBMISSION_TIMEOUT_MS",
            &HubDefaults::SUBMISSION_TIMEOUT_MS.to_string(),
        )
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "submission_timeout_ms".to_string(),
            value: env::var("HUB_SUBMISSION_TIMEOUT_MS").unwrap_or_default(),
            expected: "valid number of milliseconds".to_string(),
        })?;

        let send_timeout_ms = get_env_or_default(
            "HUB_SEND_TIMEOUT_MS",
            &HubDefaults::SEND_TIMEOUT_MS.to_string(),
        )
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "send_timeout_ms".to_string(),
            value: env::var("HUB_SEND_TIMEOUT_MS").unwrap_or_default(),
            expected: "valid number of milliseconds".to_string(),
        })?;

        let outbound_buffer = get_env_or_default(
            "HUB_OUTBOUND_BUFFER",
            &HubDefaults::OUTBOUND_BUFFER.to_string(),
        )
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "outbound_buffer".to_string(),
            value: env::var("HUB_OUTBOUND_BUFFER").unwrap_or_default(),
            expected: "valid buffer size".to_string(),
        })?;

        Ok(Self {
            submission_timeout_ms,
            send_timeout_ms,
            outbound_buffer,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.submission_timeout_ms == 0 {
            return Err(ConfigError::validation_failed(
                "Submission timeout must be greater than 0",
            ));
        }

        if self.send_timeout_ms == 0 {
            return Err(ConfigError::validation_failed(
                "Send timeout must be greater than 0",
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::validation_failed(
                "Outbound buffer must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_millis(self.submission_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

/// Bind address and shutdown behavior for the server binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long graceful shutdown may take before the process gives up.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
            shutdown_timeout_secs: ServerDefaults::SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = get_env_or_default("HTTP_HOST", ServerDefaults::HOST);

        let port = get_env_or_default("HTTP_PORT", &ServerDefaults::PORT.to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "port".to_string(),
                value: env::var("HTTP_PORT").unwrap_or_default(),
                expected: "valid TCP port".to_string(),
            })?;

        let shutdown_timeout_secs = get_env_or_default(
            "HTTP_SHUTDOWN_TIMEOUT",
            &ServerDefaults::SHUTDOWN_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidValue {
            field: "shutdown_timeout_secs".to_string(),
            value: env::var("HTTP_SHUTDOWN_TIMEOUT").unwrap_or_default(),
            expected: "valid number of seconds".to_string(),
        })?;

        Ok(Self {
            host,
            port,
            shutdown_timeout_secs,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::validation_failed("Host must be non-empty"));
        }

        if self.port == 0 {
            return Err(ConfigError::validation_failed(
                "Port must be greater than 0",
            ));
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::validation_failed(
                "Shutdown timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "host".to_string(),
                value: self.host.clone(),
                expected: "valid IP address".to_string(),
            })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
