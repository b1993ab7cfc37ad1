//! Response serialization and error mapping.
//!
//! # Responsibilities
//! - Serialize a successful fan-out into the `{ "responses": [...] }` body
//! - Map every failure class to a status code and a JSON error body
//! - Attach `Retry-After` to overload responses
//!
//! # Design Decisions
//! - Error bodies carry a stable code; the `X-Mux-Error` header repeats it
//! - Target timeouts and whole-request timeouts share 408 but never a code
//! - Internal failures are surfaced generically; details stay in the logs

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::fanout::types::{FanoutResult, TargetResponse};

/// Header repeating the error code of a failed request.
pub const X_MUX_ERROR: &str = "x-mux-error";

/// Successful fan-out body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxResponse {
    pub responses: Vec<ServiceResponse>,
}

/// One target's response as sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub service_url: String,
    pub http_status_code: u16,
    pub base64_payload: String,
    pub content_type: String,
}

impl From<TargetResponse> for ServiceResponse {
    fn from(response: TargetResponse) -> Self {
        Self {
            base64_payload: response.base64_payload(),
            service_url: response.service_url,
            http_status_code: response.http_status_code,
            content_type: response.content_type,
        }
    }
}

impl From<FanoutResult> for MuxResponse {
    fn from(result: FanoutResult) -> Self {
        Self {
            responses: result.responses.into_iter().map(Into::into).collect(),
        }
    }
}

impl IntoResponse for MuxResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Error codes for failed multiplexer requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Admission limit reached
    Overloaded,
    /// Anything but POST
    MethodNotAllowed,
    /// Body larger than the configured cap
    PayloadTooLarge,
    /// Body not received within the read timeout
    BodyReadTimeout,
    /// Body is not `{ "urls": [...] }`
    InvalidJson,
    /// More URLs than allowed per request
    TooManyUrls,
    /// A URL failed to parse
    InvalidUrl,
    /// One target exceeded its own timeout
    TargetTimeout,
    /// The whole fan-out exceeded the request timeout
    RequestTimeout,
    /// A target could not be fetched
    UpstreamFailed,
    /// Unclassified failure
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::MethodNotAllowed => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::BodyReadTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::InvalidJson => StatusCode::BAD_REQUEST,
            ErrorCode::TooManyUrls => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidUrl => StatusCode::BAD_REQUEST,
            ErrorCode::TargetTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::UpstreamFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_header_value(&self) -> &'static str {
        match self {
            ErrorCode::Overloaded => "OVERLOADED",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorCode::BodyReadTimeout => "BODY_READ_TIMEOUT",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::TooManyUrls => "TOO_MANY_URLS",
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::TargetTimeout => "TARGET_TIMEOUT",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::UpstreamFailed => "UPSTREAM_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub status: u16,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }
}

/// Build a JSON error response with the `X-Mux-Error` header.
pub fn error_response(code: ErrorCode, message: impl Into<String>) -> Response {
    let body = ErrorBody::new(code, message);
    let mut response = (code.status_code(), Json(body)).into_response();
    response.headers_mut().insert(
        X_MUX_ERROR,
        HeaderValue::from_static(code.as_header_value()),
    );
    response
}

/// 429 with a `Retry-After` hint in seconds.
pub fn overloaded_response(retry_after_secs: u64) -> Response {
    let mut response = error_response(
        ErrorCode::Overloaded,
        "Too many concurrent requests, retry later",
    );
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
    response
}
