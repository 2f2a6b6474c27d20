// src/config.rs

//! Manages engine and server configuration: loading, defaults, and validation.

use crate::core::NetError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// The transport the front door speaks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Tcp,
    WebSocket,
}

/// Tuning knobs of the engine itself: queue geometry, worker counts, and
/// the socket deadlines used by every connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Per-read deadline in milliseconds. An expired deadline ends a read
    /// cycle without failing the connection.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Socket-level write deadline in milliseconds. Expiry is retried.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Pause between write retries after a timeout, in milliseconds.
    #[serde(default = "default_write_retry_interval_ms")]
    pub write_retry_interval_ms: u64,
    /// Maximum frames read from one connection per readiness event.
    #[serde(default = "default_read_attempts")]
    pub read_attempts: usize,
    /// Largest payload accepted from a peer, in bytes.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,
    /// How long one epoll wait may block, in milliseconds. Bounds how fast
    /// the reactor notices a stop request.
    #[serde(default = "default_epoll_timeout_ms")]
    pub epoll_timeout_ms: u64,
    /// Capacity of the readiness event buffer.
    #[serde(default = "default_epoll_event_size")]
    pub epoll_event_size: usize,
    /// Back-off after a wait that returned no events, in milliseconds.
    #[serde(default = "default_reactor_idle_sleep_ms")]
    pub reactor_idle_sleep_ms: u64,

    #[serde(default = "default_dispatcher_queues")]
    pub dispatcher_queues: usize,
    #[serde(default = "default_dispatcher_queue_len")]
    pub dispatcher_queue_len: usize,
    #[serde(default = "default_workers_per_dispatcher_queue")]
    pub workers_per_dispatcher_queue: usize,

    #[serde(default = "default_task_queues")]
    pub task_queues: usize,
    #[serde(default = "default_task_queue_len")]
    pub task_queue_len: usize,
    /// More than one worker per task queue trades per-connection handler
    /// ordering for throughput.
    #[serde(default = "default_workers_per_task_queue")]
    pub workers_per_task_queue: usize,

    #[serde(default = "default_signal_queues")]
    pub signal_queues: usize,
    #[serde(default = "default_signal_queue_len")]
    pub signal_queue_len: usize,
    #[serde(default = "default_workers_per_signal_queue")]
    pub workers_per_signal_queue: usize,

    /// Number of registry shards, and therefore of keepalive sweepers.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,
    /// Keepalive period in milliseconds. A silent connection is reported
    /// inactive after two periods.
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
}

fn default_read_timeout_ms() -> u64 {
    100
}
fn default_write_timeout_ms() -> u64 {
    100
}
fn default_write_retry_interval_ms() -> u64 {
    1
}
fn default_read_attempts() -> usize {
    16
}
fn default_max_packet_size() -> usize {
    4096
}
fn default_epoll_timeout_ms() -> u64 {
    100
}
fn default_epoll_event_size() -> usize {
    1024
}
fn default_reactor_idle_sleep_ms() -> u64 {
    1
}
fn default_dispatcher_queues() -> usize {
    8
}
fn default_dispatcher_queue_len() -> usize {
    128
}
fn default_workers_per_dispatcher_queue() -> usize {
    2
}
fn default_task_queues() -> usize {
    8
}
fn default_task_queue_len() -> usize {
    128
}
fn default_workers_per_task_queue() -> usize {
    1
}
fn default_signal_queues() -> usize {
    2
}
fn default_signal_queue_len() -> usize {
    64
}
fn default_workers_per_signal_queue() -> usize {
    1
}
fn default_shard_count() -> usize {
    16
}
fn default_health_check_interval_ms() -> u64 {
    100_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            write_retry_interval_ms: default_write_retry_interval_ms(),
            read_attempts: default_read_attempts(),
            max_packet_size: default_max_packet_size(),
            epoll_timeout_ms: default_epoll_timeout_ms(),
            epoll_event_size: default_epoll_event_size(),
            reactor_idle_sleep_ms: default_reactor_idle_sleep_ms(),
            dispatcher_queues: default_dispatcher_queues(),
            dispatcher_queue_len: default_dispatcher_queue_len(),
            workers_per_dispatcher_queue: default_workers_per_dispatcher_queue(),
            task_queues: default_task_queues(),
            task_queue_len: default_task_queue_len(),
            workers_per_task_queue: default_workers_per_task_queue(),
            signal_queues: default_signal_queues(),
            signal_queue_len: default_signal_queue_len(),
            workers_per_signal_queue: default_workers_per_signal_queue(),
            shard_count: default_shard_count(),
            health_check_interval_ms: default_health_check_interval_ms(),
        }
    }
}

impl EngineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn write_retry_interval(&self) -> Duration {
        Duration::from_millis(self.write_retry_interval_ms)
    }

    pub fn reactor_idle_sleep(&self) -> Duration {
        Duration::from_millis(self.reactor_idle_sleep_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Rejects values the engine cannot run with. Zero deadlines are
    /// refused because the socket layer treats them as invalid.
    pub fn validate(&self) -> Result<(), NetError> {
        let positive = [
            ("read_timeout_ms", self.read_timeout_ms as usize),
            ("write_timeout_ms", self.write_timeout_ms as usize),
            ("read_attempts", self.read_attempts),
            ("max_packet_size", self.max_packet_size),
            ("epoll_event_size", self.epoll_event_size),
            ("dispatcher_queues", self.dispatcher_queues),
            ("dispatcher_queue_len", self.dispatcher_queue_len),
            ("workers_per_dispatcher_queue", self.workers_per_dispatcher_queue),
            ("task_queues", self.task_queues),
            ("task_queue_len", self.task_queue_len),
            ("workers_per_task_queue", self.workers_per_task_queue),
            ("signal_queues", self.signal_queues),
            ("signal_queue_len", self.signal_queue_len),
            ("workers_per_signal_queue", self.workers_per_signal_queue),
            ("shard_count", self.shard_count),
            ("health_check_interval_ms", self.health_check_interval_ms as usize),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(NetError::Config(format!("{name} must be greater than 0")));
        }
        if self.max_packet_size > u32::MAX as usize {
            return Err(NetError::Config(
                "max_packet_size cannot exceed the 32-bit length field".into(),
            ));
        }
        if self.epoll_timeout_ms > i32::MAX as u64 {
            return Err(NetError::Config("epoll_timeout_ms is out of range".into()));
        }
        Ok(())
    }
}

/// The top-level configuration read from `config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub network_mode: NetworkMode,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Connections beyond this limit are refused at accept time. `0` disables the limit.
    #[serde(default = "default_max_conns")]
    pub max_conns: usize,
    /// Time allowed for the WebSocket upgrade handshake, in milliseconds.
    #[serde(default = "default_ws_handshake_timeout_ms")]
    pub ws_handshake_timeout_ms: u64,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9100
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_conns() -> usize {
    10_000
}
fn default_ws_handshake_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            network_mode: NetworkMode::default(),
            log_level: default_log_level(),
            max_conns: default_max_conns(),
            ws_handshake_timeout_ms: default_ws_handshake_timeout_ms(),
            engine: EngineConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file and validates it.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            anyhow::bail!("host cannot be empty");
        }
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }
        if self.ws_handshake_timeout_ms == 0 {
            anyhow::bail!("ws_handshake_timeout_ms must be greater than 0");
        }
        if self.metrics.enabled && self.metrics.port == self.port {
            anyhow::bail!("metrics.port must differ from the server port");
        }
        self.engine
            .validate()
            .context("Invalid [engine] section")?;

        if self.engine.workers_per_task_queue > 1 {
            warn!(
                "workers_per_task_queue is {}; requests from one connection may be handled out of order.",
                self.engine.workers_per_task_queue
            );
        }
        Ok(())
    }

    /// Serializes the configuration back to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Writes the configuration, defaults included, to `path`.
    pub fn export(&self, path: &str) -> Result<()> {
        let contents = self.to_toml_string()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file at '{path}'"))
    }

    pub fn ws_handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.ws_handshake_timeout_ms)
    }

    /// The `host:port` string the gateway binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
