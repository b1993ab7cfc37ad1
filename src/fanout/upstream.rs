//! Outbound calls to target services.
//!
//! # Responsibilities
//! - Issue one outbound request per target
//! - Read the full payload and content type
//! - Classify transport errors (connect vs. other vs. body)
//!
//! # Design Decisions
//! - Deadlines and cancellation belong to the engine, not the client
//! - Non-2xx statuses are responses, not failures; the status is passed through
//! - Outbound requests are POST with an empty body

use std::future::Future;

use axum::http::header;

use crate::config::ConcurrencyBudget;
use crate::fanout::types::{FailureReason, TargetResponse};

/// Something that can fetch a target URL.
pub trait Upstream: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<TargetResponse, FailureReason>> + Send;
}

/// Production upstream backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build a client whose idle pool matches the per-request outbound ceiling.
    pub fn new(budget: &ConcurrencyBudget) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(budget.max_outbound_per_request)
            .user_agent(concat!("http-multiplexer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Upstream for HttpUpstream {
    fn fetch(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<TargetResponse, FailureReason>> + Send {
        async move {
            let response = self.client.post(url).send().await.map_err(|e| {
                if e.is_connect() {
                    FailureReason::Connect(e.to_string())
                } else {
                    FailureReason::Transport(e.to_string())
                }
            })?;

            let http_status_code = response.status().as_u16();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let payload = response
                .bytes()
                .await
                .map_err(|e| FailureReason::Body(e.to_string()))?;

            Ok(TargetResponse {
                service_url: url.to_string(),
                http_status_code,
                content_type,
                payload,
            })
        }
    }
}
