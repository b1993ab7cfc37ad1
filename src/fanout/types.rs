//! Fan-out outcome types and error definitions.

use std::time::Duration;

use axum::body::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

/// A fully read response from one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetResponse {
    /// The target URL exactly as the client submitted it.
    pub service_url: String,
    pub http_status_code: u16,
    /// Upstream `Content-Type`, empty when absent.
    pub content_type: String,
    pub payload: Bytes,
}

impl TargetResponse {
    /// Payload encoded with the standard padded base64 alphabet.
    pub fn base64_payload(&self) -> String {
        STANDARD.encode(&self.payload)
    }
}

/// Why a single outbound call did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The per-target deadline elapsed.
    #[error("timeout for request to url")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other request-level error.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response head arrived but the body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The batch was abandoned before this call finished.
    #[error("cancelled")]
    Cancelled,
}

impl FailureReason {
    /// Short label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Connect(_) => "connect_error",
            FailureReason::Transport(_) => "transport_error",
            FailureReason::Body(_) => "body_error",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// Exactly one of these is produced per launched target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Success(TargetResponse),
    Failure { url: String, reason: FailureReason },
}

/// Responses for every target, in the order the targets were submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutResult {
    pub responses: Vec<TargetResponse>,
}

impl FanoutResult {
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Errors that end a fan-out without a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FanoutError {
    /// The target list exceeds the per-request maximum.
    #[error("Too many urls requested, got {got}, but max is: {max}")]
    TooManyTargets { got: usize, max: usize },

    /// One target failed; the whole batch fails with it.
    #[error("an error occurred while accessing url {url:?}: {reason}")]
    Target { url: String, reason: FailureReason },

    /// The whole-request deadline elapsed before every chunk reported.
    #[error("request not completed within {0:?}")]
    RequestTimeout(Duration),

    /// The inbound call went away.
    #[error("request cancelled by client")]
    Cancelled,

    /// An outbound task died without reporting.
    #[error("internal error: {0}")]
    Internal(String),
}

impl FanoutError {
    /// True when a single target ran out of time (as opposed to the whole request).
    pub fn is_target_timeout(&self) -> bool {
        matches!(
            self,
            FanoutError::Target {
                reason: FailureReason::Timeout,
                ..
            }
        )
    }
}
