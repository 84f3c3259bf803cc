// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service configuration.
//!
//! Precedence is CLI flags > TOML file > built-in defaults, matching
//! values against their environment variable equivalents via clap's
//! `env` feature.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// CLI arguments, mirroring [`IngestConfig`] one field at a time.
#[derive(Parser, Debug)]
#[command(name = "flow-ingest")]
#[command(author, version, long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ", env!("VERGEN_GIT_SHA"), ", built ", env!("VERGEN_BUILD_DATE"), ")"
), about = "sFlow v5 ingest service", long_about = None)]
pub struct Args {
    /// Optional TOML config file, merged under CLI overrides.
    #[arg(long, env = "FLOW_INGEST_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Kafka-compatible bootstrap brokers, comma separated.
    #[arg(long, env = "FLOW_INGEST_BROKERS", value_delimiter = ',')]
    pub brokers: Option<Vec<String>>,

    /// Use IAM/OAUTHBEARER authentication against the bus.
    #[arg(long, env = "FLOW_INGEST_AUTH_IAM")]
    pub auth_iam: bool,

    /// Destination topic name.
    #[arg(long, env = "FLOW_INGEST_TOPIC")]
    pub topic: Option<String>,

    /// Topic partition count (created if missing).
    #[arg(long, env = "FLOW_INGEST_PARTITIONS")]
    pub partitions: Option<u32>,

    /// Topic replication factor (created if missing).
    #[arg(long, env = "FLOW_INGEST_REPLICATION")]
    pub replication: Option<u16>,

    /// UDP port to receive sFlow v5 datagrams on.
    #[arg(long, env = "FLOW_INGEST_UDP_PORT")]
    pub udp_port: Option<u16>,

    /// TCP port for the health listener (defaults to `udp_port`).
    #[arg(long, env = "FLOW_INGEST_HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Per-read deadline on the UDP socket, in milliseconds.
    #[arg(long, env = "FLOW_INGEST_READ_TIMEOUT_MS")]
    pub read_timeout_ms: Option<u64>,

    /// Number of decode/produce worker tasks.
    #[arg(long, env = "FLOW_INGEST_WORKERS")]
    pub worker_count: Option<usize>,

    /// Bounded queue capacity between reader and workers.
    #[arg(long, env = "FLOW_INGEST_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Scratch buffer size for each UDP read.
    #[arg(long, env = "FLOW_INGEST_UDP_BUFFER_BYTES")]
    pub udp_buffer_bytes: Option<usize>,

    /// Bind address for the Prometheus `/metrics` endpoint.
    #[arg(long, env = "FLOW_INGEST_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Enable the optional CPU/heap profiling endpoint.
    #[arg(long, env = "FLOW_INGEST_ENABLE_PROFILING")]
    pub enable_profiling: bool,

    /// Widen the default log filter to debug-level.
    #[arg(long, short = 'v', env = "FLOW_INGEST_VERBOSE")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FLOW_INGEST_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Fully resolved, validated service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub brokers: Vec<String>,
    #[serde(default)]
    pub auth_iam: bool,
    pub topic: String,
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    #[serde(default = "default_replication")]
    pub replication: u16,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default)]
    pub health_port: Option<u16>,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_udp_buffer_bytes")]
    pub udp_buffer_bytes: usize,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    #[serde(default)]
    pub enable_profiling: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_partitions() -> u32 {
    1
}
fn default_replication() -> u16 {
    1
}
fn default_udp_port() -> u16 {
    6343
}
fn default_read_timeout_ms() -> u64 {
    250
}
fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_udp_buffer_bytes() -> usize {
    65535
}
fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default metrics addr")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            auth_iam: false,
            topic: String::new(),
            partitions: default_partitions(),
            replication: default_replication(),
            udp_port: default_udp_port(),
            health_port: None,
            read_timeout_ms: default_read_timeout_ms(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            udp_buffer_bytes: default_udp_buffer_bytes(),
            metrics_addr: default_metrics_addr(),
            enable_profiling: false,
            verbose: false,
            log_level: default_log_level(),
        }
    }
}

impl IngestConfig {
    /// Load a TOML overlay from disk, falling back to built-in defaults
    /// for any field the file omits.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge CLI overrides on top of `self` (file or default values).
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(brokers) = &args.brokers {
            self.brokers = brokers.clone();
        }
        if args.auth_iam {
            self.auth_iam = true;
        }
        if let Some(topic) = &args.topic {
            self.topic = topic.clone();
        }
        if let Some(partitions) = args.partitions {
            self.partitions = partitions;
        }
        if let Some(replication) = args.replication {
            self.replication = replication;
        }
        if let Some(udp_port) = args.udp_port {
            self.udp_port = udp_port;
        }
        if let Some(health_port) = args.health_port {
            self.health_port = Some(health_port);
        }
        if let Some(ms) = args.read_timeout_ms {
            self.read_timeout_ms = ms;
        }
        if let Some(n) = args.worker_count {
            self.worker_count = n;
        }
        if let Some(n) = args.queue_capacity {
            self.queue_capacity = n;
        }
        if let Some(n) = args.udp_buffer_bytes {
            self.udp_buffer_bytes = n;
        }
        if let Some(addr) = args.metrics_addr {
            self.metrics_addr = addr;
        }
        if args.enable_profiling {
            self.enable_profiling = true;
        }
        if args.verbose {
            self.verbose = true;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
    }

    /// The TCP port the health listener binds, defaulting to the UDP port.
    pub fn health_port(&self) -> u16 {
        self.health_port.unwrap_or(self.udp_port)
    }

    /// Build and validate a config from parsed CLI args.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot start a service.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.is_empty() {
            return Err(ConfigError::Invalid("brokers must not be empty".into()));
        }
        if self.topic.is_empty() {
            return Err(ConfigError::Invalid("topic must not be empty".into()));
        }
        if self.partitions == 0 {
            return Err(ConfigError::Invalid("partitions must be >= 1".into()));
        }
        if self.replication == 0 {
            return Err(ConfigError::Invalid("replication must be >= 1".into()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("worker_count must be >= 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be >= 1".into()));
        }
        if self.udp_buffer_bytes == 0 {
            return Err(ConfigError::Invalid("udp_buffer_bytes must be >= 1".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be >= 1".into()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
