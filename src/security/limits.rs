//! Request method and size limits.
//!
//! # Responsibilities
//! - Accept only the single supported verb (POST)
//! - Enforce maximum request body size
//! - Bound the time spent reading the body
//!
//! # Design Decisions
//! - Limits checked before parsing (early rejection)
//! - Declared Content-Length is rejected before reading anything
//! - Violations are client errors and never reach the fan-out engine

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Method};
use http_body_util::LengthLimitError;
use thiserror::Error;

/// Reasons an inbound request fails the limits stage.
#[derive(Debug, Error)]
pub enum LimitError {
    #[error("expected POST HTTP method, but got: {0}")]
    Method(Method),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request body not received within {0:?}")]
    ReadTimeout(Duration),

    #[error("failed to read request body: {0}")]
    Read(String),
}

/// Only POST is served.
pub fn check_method(method: &Method) -> Result<(), LimitError> {
    if method == Method::POST {
        Ok(())
    } else {
        Err(LimitError::Method(method.clone()))
    }
}

/// Read the whole body, enforcing the size cap and the read deadline.
pub async fn read_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
    read_timeout: Duration,
) -> Result<Bytes, LimitError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(LimitError::PayloadTooLarge { limit });
    }

    match tokio::time::timeout(read_timeout, axum::body::to_bytes(body, limit)).await {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => {
            let too_large = std::error::Error::source(&e)
                .is_some_and(|source| source.is::<LengthLimitError>());
            if too_large {
                Err(LimitError::PayloadTooLarge { limit })
            } else {
                Err(LimitError::Read(e.to_string()))
            }
        }
        Err(_) => Err(LimitError::ReadTimeout(read_timeout)),
    }
}
