//! Request handling and validation.
//!
//! # Responsibilities
//! - Generate unique request IDs (UUID v4)
//! - Decode the `{ "urls": [...] }` body
//! - Reject target URLs that are not absolute http(s) URLs
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Validation stops at the first offending entry and names it

use axum::http::{HeaderValue, Request};
use serde::{Deserialize, Serialize};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Inbound fan-out request body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MuxRequest {
    /// A body without `urls` asks for nothing.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl MuxRequest {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Return the first entry that is not an absolute `http`/`https` URL with a host.
pub fn find_invalid_url(urls: &[String]) -> Option<&str> {
    urls.iter()
        .find(|candidate| !is_valid_target(candidate))
        .map(String::as_str)
}

fn is_valid_target(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
        Err(_) => false,
    }
}

/// Generates a fresh UUID v4 for requests that arrive without an ID.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}
