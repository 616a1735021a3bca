// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Courier Configuration
//!
//! Configuration is resolved in layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`)
//! 3. `COURIER_*` environment variables (a `.env` file is honoured)
//! 4. Command line flags
//!
//! The resolved [`Config`] is immutable for the lifetime of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Which transport carries the envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Direct framed TCP
    Socket,
    /// Message queue relay with a TCP side-channel for the key exchange
    Queue,
    /// Bidirectional gRPC stream
    Stream,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportMode::Socket => "socket",
            TransportMode::Queue => "queue",
            TransportMode::Stream => "stream",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "socket" => Ok(TransportMode::Socket),
            "queue" => Ok(TransportMode::Queue),
            "stream" | "grpc" => Ok(TransportMode::Stream),
            other => Err(ConfigError::InvalidValue {
                key: "transport".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Direct socket transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
        }
    }
}

impl SocketConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Queue relay transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Broker URI, e.g. `amqp://localhost:5672/%2f`
    pub uri: String,
    pub queue_name: String,
    pub username: String,
    pub password: String,
    pub durable: bool,
    /// Host of the key exchange side-channel
    pub side_channel_host: String,
    /// Port of the key exchange side-channel
    pub side_channel_port: u16,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            uri: "amqp://localhost:5672/%2f".to_string(),
            queue_name: "flights".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            durable: true,
            side_channel_host: "127.0.0.1".to_string(),
            side_channel_port: 9091,
        }
    }
}

impl QueueConfig {
    pub fn side_channel_address(&self) -> String {
        format!("{}:{}", self.side_channel_host, self.side_channel_port)
    }

    /// Broker URI with credentials filled in
    ///
    /// A URI that already carries credentials is returned unchanged.
    pub fn connection_uri(&self) -> String {
        let Ok(mut url) = Url::parse(&self.uri) else {
            return self.uri.clone();
        };
        if !url.username().is_empty() || self.username.is_empty() {
            return self.uri.clone();
        }
        // Url percent-encodes reserved characters in the userinfo
        if url.set_username(&self.username).is_err()
            || url.set_password(Some(&self.password)).is_err()
        {
            return self.uri.clone();
        }
        url.to_string()
    }
}

/// gRPC stream transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub host: String,
    pub port: u16,
    /// How long the client waits for the server to finish after half-close
    pub completion_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
            completion_timeout_secs: 60,
        }
    }
}

impl StreamConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port` endpoint for the client
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

/// Producer input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flights.json"),
        }
    }
}

/// Consumer output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("flights.jsonl"),
        }
    }
}

/// Complete courier configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportMode,
    pub socket: SocketConfig,
    pub queue: QueueConfig,
    pub stream: StreamConfig,
    pub source: SourceConfig,
    pub sink: SinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportMode::Socket,
            socket: SocketConfig::default(),
            queue: QueueConfig::default(),
            stream: StreamConfig::default(),
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Defaults, then the optional file, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `COURIER_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("COURIER_TRANSPORT") {
            self.transport = val.parse()?;
        }

        if let Some(val) = lookup("COURIER_SOCKET_HOST") {
            self.socket.host = val;
        }
        if let Some(val) = lookup("COURIER_SOCKET_PORT") {
            self.socket.port = parse_value("COURIER_SOCKET_PORT", &val)?;
        }

        if let Some(val) = lookup("COURIER_QUEUE_URI") {
            self.queue.uri = val;
        }
        if let Some(val) = lookup("COURIER_QUEUE_NAME") {
            self.queue.queue_name = val;
        }
        if let Some(val) = lookup("COURIER_QUEUE_USERNAME") {
            self.queue.username = val;
        }
        if let Some(val) = lookup("COURIER_QUEUE_PASSWORD") {
            self.queue.password = val;
        }
        if let Some(val) = lookup("COURIER_QUEUE_DURABLE") {
            self.queue.durable = parse_value("COURIER_QUEUE_DURABLE", &val)?;
        }
        if let Some(val) = lookup("COURIER_SIDE_CHANNEL_HOST") {
            self.queue.side_channel_host = val;
        }
        if let Some(val) = lookup("COURIER_SIDE_CHANNEL_PORT") {
            self.queue.side_channel_port = parse_value("COURIER_SIDE_CHANNEL_PORT", &val)?;
        }

        if let Some(val) = lookup("COURIER_STREAM_HOST") {
            self.stream.host = val;
        }
        if let Some(val) = lookup("COURIER_STREAM_PORT") {
            self.stream.port = parse_value("COURIER_STREAM_PORT", &val)?;
        }
        if let Some(val) = lookup("COURIER_STREAM_TIMEOUT_SECS") {
            self.stream.completion_timeout_secs =
                parse_value("COURIER_STREAM_TIMEOUT_SECS", &val)?;
        }

        if let Some(val) = lookup("COURIER_SOURCE_PATH") {
            self.source.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("COURIER_SINK_PATH") {
            self.sink.path = PathBuf::from(val);
        }

        Ok(self)
    }

    /// Checks shared by both roles
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = Url::parse(&self.queue.uri) {
            return Err(ConfigError::Invalid(format!(
                "queue.uri '{}' is not a valid URI: {}",
                self.queue.uri, e
            )));
        }
        if self.queue.queue_name.trim().is_empty() {
            return Err(ConfigError::Invalid("queue name must not be empty".to_string()));
        }
        if self.stream.completion_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "stream completion timeout must be greater than zero".to_string(),
            ));
        }
        for (name, host) in [
            ("socket.host", &self.socket.host),
            ("queue.side_channel_host", &self.queue.side_channel_host),
            ("stream.host", &self.stream.host),
        ] {
            if host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Producer-side checks: the selected transport needs a concrete port
    ///
    /// Servers may bind port 0 to get an ephemeral port; clients may not.
    pub fn validate_client(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let (name, port) = match self.transport {
            TransportMode::Socket => ("socket.port", self.socket.port),
            TransportMode::Queue => ("queue.side_channel_port", self.queue.side_channel_port),
            TransportMode::Stream => ("stream.port", self.stream.port),
        };
        if port == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} must not be 0 for the {} client",
                name, self.transport
            )));
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
