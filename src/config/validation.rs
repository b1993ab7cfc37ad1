//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (budgets > 0, timeouts > 0)
//! - Enforce the chunk size ceiling against the per-request target limit
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MuxConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system; any error is fatal at startup

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::MuxConfig;

/// A single semantic problem with a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A numeric setting that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Chunk size exceeds the per-request target limit.
    #[error(
        "max_outbound_per_request ({outbound}) is larger than max_targets_per_request ({targets})"
    )]
    OutboundExceedsTargets { outbound: usize, targets: usize },

    /// Address does not parse as `ip:port`.
    #[error("invalid {field} {value:?}")]
    Address { field: &'static str, value: String },
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &MuxConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let concurrency = &config.concurrency;
    if concurrency.max_inbound_connections == 0 {
        errors.push(ValidationError::Zero("max_inbound_connections"));
    }
    if concurrency.max_targets_per_request == 0 {
        errors.push(ValidationError::Zero("max_targets_per_request"));
    }
    if concurrency.max_outbound_per_request == 0 {
        errors.push(ValidationError::Zero("max_outbound_per_request"));
    }
    if concurrency.max_outbound_per_request > concurrency.max_targets_per_request {
        errors.push(ValidationError::OutboundExceedsTargets {
            outbound: concurrency.max_outbound_per_request,
            targets: concurrency.max_targets_per_request,
        });
    }

    if config.timeouts.target_timeout_ms == 0 {
        errors.push(ValidationError::Zero("target_timeout_ms"));
    }
    if config.timeouts.request_timeout_ms == 0 {
        errors.push(ValidationError::Zero("request_timeout_ms"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::Zero("max_body_bytes"));
    }
    if config.shutdown.drain_timeout_secs == 0 {
        errors.push(ValidationError::Zero("drain_timeout_secs"));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
