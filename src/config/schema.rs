//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the multiplexer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MuxConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Inbound and outbound concurrency ceilings.
    pub concurrency: ConcurrencyConfig,

    /// Per-target and whole-request deadlines.
    pub timeouts: TimeoutConfig,

    /// Inbound request size limits.
    pub limits: LimitsConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl MuxConfig {
    /// Concurrency budget handed to the limiter and the fan-out engine.
    pub fn concurrency_budget(&self) -> ConcurrencyBudget {
        ConcurrencyBudget {
            max_inbound_connections: self.concurrency.max_inbound_connections,
            max_targets_per_request: self.concurrency.max_targets_per_request,
            max_outbound_per_request: self.concurrency.max_outbound_per_request,
        }
    }

    /// Timeout budget handed to the fan-out engine and the pipeline.
    pub fn timeout_budget(&self) -> TimeoutBudget {
        TimeoutBudget {
            target_timeout: Duration::from_millis(self.timeouts.target_timeout_ms),
            request_timeout: Duration::from_millis(self.timeouts.request_timeout_ms),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Concurrency ceilings as they appear in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum inbound requests processed at once; extra requests get 429.
    pub max_inbound_connections: usize,

    /// Maximum number of URLs accepted in a single request.
    pub max_targets_per_request: usize,

    /// Maximum outbound calls in flight for a single request (chunk size).
    pub max_outbound_per_request: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_inbound_connections: 100,
            max_targets_per_request: 20,
            max_outbound_per_request: 4,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single outbound call in milliseconds.
    pub target_timeout_ms: u64,

    /// Deadline for the whole fan-out (and the inbound body read) in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            target_timeout_ms: 1_000,
            request_timeout_ms: 10_000,
        }
    }
}

/// Inbound request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight requests may drain before shutdown is forced.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Concurrency ceilings shared by the limiter and the fan-out engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyBudget {
    pub max_inbound_connections: usize,
    pub max_targets_per_request: usize,
    pub max_outbound_per_request: usize,
}

/// Deadlines for one outbound call and for a whole fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutBudget {
    pub target_timeout: Duration,
    pub request_timeout: Duration,
}

impl TimeoutBudget {
    /// Retry hint sent with 429 responses: half the request timeout, at least one second.
    pub fn retry_after_secs(&self) -> u64 {
        (self.request_timeout.as_secs() / 2).max(1)
    }
}
