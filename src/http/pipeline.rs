//! The per-request pipeline.
//!
//! ```text
//! admission (429 + Retry-After)
//!     → method / body limits
//!     → decode { "urls": [...] }, count and syntax checks
//!     → fan-out engine
//!     → serialize result or mapped error
//! ```
//!
//! Each stage short-circuits. The admission slot is held for the rest of the
//! pipeline and released exactly once when it is dropped.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::{MuxConfig, TimeoutBudget};
use crate::fanout::{FanoutEngine, FanoutError, FanoutResult, Upstream};
use crate::http::request::{find_invalid_url, MuxRequest};
use crate::http::response::{error_response, overloaded_response, ErrorCode, MuxResponse};
use crate::observability::metrics;
use crate::security::admission::AdmissionLimiter;
use crate::security::limits::{check_method, read_body, LimitError};

/// Status recorded for requests whose client went away (nginx convention).
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// What the transport layer should do with a finished request.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Send this response.
    Respond(Response),
    /// The caller disconnected; no response is owed.
    Abandoned,
}

/// Everything that can end a request short of a full result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Limit(#[from] LimitError),

    #[error("Expected json encoded data: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Incorrect format of incoming url: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Fanout(#[from] FanoutError),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Limit(LimitError::Method(_)) => ErrorCode::MethodNotAllowed,
            PipelineError::Limit(LimitError::PayloadTooLarge { .. }) => ErrorCode::PayloadTooLarge,
            PipelineError::Limit(LimitError::ReadTimeout(_)) => ErrorCode::BodyReadTimeout,
            PipelineError::Limit(LimitError::Read(_)) => ErrorCode::InvalidJson,
            PipelineError::InvalidJson(_) => ErrorCode::InvalidJson,
            PipelineError::InvalidUrl(_) => ErrorCode::InvalidUrl,
            PipelineError::Fanout(FanoutError::TooManyTargets { .. }) => ErrorCode::TooManyUrls,
            PipelineError::Fanout(err) if err.is_target_timeout() => ErrorCode::TargetTimeout,
            PipelineError::Fanout(FanoutError::RequestTimeout(_)) => ErrorCode::RequestTimeout,
            PipelineError::Fanout(FanoutError::Target { .. }) => ErrorCode::UpstreamFailed,
            PipelineError::Fanout(FanoutError::Cancelled)
            | PipelineError::Fanout(FanoutError::Internal(_)) => ErrorCode::InternalError,
        }
    }

    /// Client-facing message; upstream and internal detail is only logged.
    fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidJson(_) => "Expected json encoded data".to_string(),
            PipelineError::Fanout(FanoutError::Target { url, .. }) if !self.is_target_timeout() => {
                format!("an error occurred while accessing url {url:?}")
            }
            PipelineError::Fanout(FanoutError::Internal(_)) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    fn is_target_timeout(&self) -> bool {
        matches!(self, PipelineError::Fanout(err) if err.is_target_timeout())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let code = self.code();
        if code.status_code().is_server_error() {
            tracing::error!(error = %self, code = code.as_header_value(), "Request failed");
        } else {
            tracing::debug!(error = %self, code = code.as_header_value(), "Request rejected");
        }
        error_response(code, self.public_message())
    }
}

/// Admission → validation → fan-out → serialization.
pub struct RequestPipeline<U> {
    limiter: Arc<AdmissionLimiter>,
    engine: FanoutEngine<U>,
    timeouts: TimeoutBudget,
    max_body_bytes: usize,
}

impl<U: Upstream> RequestPipeline<U> {
    pub fn new(config: &MuxConfig, upstream: U) -> Self {
        let concurrency = config.concurrency_budget();
        let timeouts = config.timeout_budget();
        Self {
            limiter: Arc::new(AdmissionLimiter::new(concurrency.max_inbound_connections)),
            engine: FanoutEngine::new(upstream, concurrency, timeouts),
            timeouts,
            max_body_bytes: config.limits.max_body_bytes,
        }
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    /// Run one inbound request through every stage.
    ///
    /// `cancel` represents the inbound call; once it fires no response is owed.
    pub async fn handle(&self, request: Request<Body>, cancel: CancellationToken) -> PipelineOutcome {
        let start = Instant::now();

        let Some(slot) = self.limiter.try_admit() else {
            metrics::record_admission_rejected();
            tracing::warn!(
                capacity = self.limiter.capacity(),
                "Admission limit reached, rejecting request"
            );
            let response = overloaded_response(self.timeouts.retry_after_secs());
            metrics::record_request(response.status().as_u16(), start);
            return PipelineOutcome::Respond(response);
        };
        metrics::set_inflight(self.limiter.occupied());

        let result = self.process(request, &cancel).await;

        drop(slot);
        metrics::set_inflight(self.limiter.occupied());

        let outcome = match result {
            Ok(fanout) => {
                tracing::info!(targets = fanout.len(), "Fan-out completed");
                PipelineOutcome::Respond(MuxResponse::from(fanout).into_response())
            }
            Err(PipelineError::Fanout(FanoutError::Cancelled)) => {
                tracing::info!("Client went away, dropping response");
                PipelineOutcome::Abandoned
            }
            Err(e) => PipelineOutcome::Respond(e.into_response()),
        };

        let status = match &outcome {
            PipelineOutcome::Respond(response) => response.status().as_u16(),
            PipelineOutcome::Abandoned => CLIENT_CLOSED_REQUEST,
        };
        metrics::record_request(status, start);
        outcome
    }

    async fn process(
        &self,
        request: Request<Body>,
        cancel: &CancellationToken,
    ) -> Result<FanoutResult, PipelineError> {
        let (parts, body) = request.into_parts();
        check_method(&parts.method)?;

        let bytes = read_body(
            &parts.headers,
            body,
            self.max_body_bytes,
            self.timeouts.request_timeout,
        )
        .await?;
        let request = MuxRequest::from_slice(&bytes).map_err(PipelineError::InvalidJson)?;

        let max = self.engine.concurrency().max_targets_per_request;
        if request.urls.len() > max {
            return Err(FanoutError::TooManyTargets {
                got: request.urls.len(),
                max,
            }
            .into());
        }
        if let Some(invalid) = find_invalid_url(&request.urls) {
            return Err(PipelineError::InvalidUrl(invalid.to_string()));
        }

        tracing::debug!(targets = request.urls.len(), "Starting fan-out");
        Ok(self.engine.execute(&request.urls, cancel).await?)
    }
}

/// Response used if a handler observes its own cancellation; never reaches a live client.
pub fn abandoned_response() -> Response {
    StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
        .unwrap_or(StatusCode::BAD_REQUEST)
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::{FailureReason, TargetResponse};
    use crate::http::response::{ErrorBody, X_MUX_ERROR};
    use axum::body::Bytes;
    use axum::http::header;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Responds after `delay`; URLs containing "refuse" fail, "hang" never answer.
    struct ScriptedUpstream {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl Upstream for ScriptedUpstream {
        fn fetch(
            &self,
            url: &str,
        ) -> impl Future<Output = Result<TargetResponse, FailureReason>> + Send {
            let delay = self.delay;
            let calls = Arc::clone(&self.calls);
            let url = url.to_string();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if url.contains("hang") {
                    std::future::pending::<()>().await;
                }
                tokio::time::sleep(delay).await;
                if url.contains("refuse") {
                    return Err(FailureReason::Connect("connection refused".into()));
                }
                Ok(TargetResponse {
                    service_url: url,
                    http_status_code: 200,
                    content_type: "application/json".into(),
                    payload: Bytes::from_static(b"{\"ok\":true}"),
                })
            }
        }
    }

    fn build_pipeline(
        configure: impl FnOnce(&mut MuxConfig),
    ) -> (Arc<RequestPipeline<ScriptedUpstream>>, Arc<AtomicUsize>) {
        let mut config = MuxConfig::default();
        config.concurrency.max_inbound_connections = 1;
        config.concurrency.max_targets_per_request = 3;
        config.concurrency.max_outbound_per_request = 2;
        config.timeouts.target_timeout_ms = 500;
        config.timeouts.request_timeout_ms = 4_000;
        configure(&mut config);

        let calls = Arc::new(AtomicUsize::new(0));
        let upstream = ScriptedUpstream {
            delay: Duration::from_millis(10),
            calls: Arc::clone(&calls),
        };
        (Arc::new(RequestPipeline::new(&config, upstream)), calls)
    }

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/mux")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn respond(
        pipeline: &RequestPipeline<ScriptedUpstream>,
        request: Request<Body>,
    ) -> Response {
        match pipeline.handle(request, CancellationToken::new()).await {
            PipelineOutcome::Respond(response) => response,
            PipelineOutcome::Abandoned => panic!("unexpected abandon"),
        }
    }

    async fn error_body(response: Response) -> ErrorBody {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn success_serializes_all_targets() {
        let (pipeline, _) = build_pipeline(|_| {});
        let response = respond(
            &pipeline,
            post(r#"{"urls":["http://a.test/","http://b.test/","http://c.test/"]}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: MuxResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.responses.len(), 3);
        assert_eq!(body.responses[2].service_url, "http://c.test/");
        assert_eq!(body.responses[0].base64_payload, "eyJvayI6dHJ1ZX0=");
        assert_eq!(pipeline.limiter().occupied(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn body_without_urls_is_empty_success() {
        let (pipeline, calls) = build_pipeline(|_| {});
        let response = respond(&pipeline, post("{}")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"responses":[]}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overload_returns_retry_hint_without_touching_engine() {
        let (pipeline, calls) = build_pipeline(|_| {});
        let held = pipeline.limiter().try_admit().unwrap();

        let response = respond(&pipeline, post(r#"{"urls":["http://a.test/"]}"#)).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(held);
        let response = respond(&pipeline, post(r#"{"urls":["http://a.test/"]}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_method_rejected() {
        let (pipeline, _) = build_pipeline(|_| {});
        let request = Request::builder()
            .method("GET")
            .uri("/api/mux")
            .body(Body::empty())
            .unwrap();
        let response = respond(&pipeline, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(X_MUX_ERROR).unwrap(), "METHOD_NOT_ALLOWED");
        assert_eq!(pipeline.limiter().occupied(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_rejected_before_outbound_calls() {
        let (pipeline, calls) = build_pipeline(|c| c.limits.max_body_bytes = 128);

        let cases = [
            ("not json", StatusCode::BAD_REQUEST, ErrorCode::InvalidJson),
            (
                r#"{"urls":["http://a.test","http://b.test","http://c.test","http://d.test"]}"#,
                StatusCode::BAD_REQUEST,
                ErrorCode::TooManyUrls,
            ),
            (
                r#"{"urls":["http://a.test","b.test"]}"#,
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidUrl,
            ),
        ];
        for (body, status, code) in cases {
            let response = respond(&pipeline, post(body)).await;
            assert_eq!(response.status(), status);
            assert_eq!(error_body(response).await.code, code);
        }

        let big = format!(r#"{{"urls":["http://{}.test"]}}"#, "x".repeat(200));
        let response = respond(&pipeline, post(&big)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.limiter().occupied(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn too_many_urls_names_the_maximum() {
        let (pipeline, _) = build_pipeline(|_| {});
        let response = respond(
            &pipeline,
            post(r#"{"urls":["http://a.test","http://b.test","http://c.test","http://d.test"]}"#),
        )
        .await;
        let body = error_body(response).await;
        assert_eq!(body.message, "Too many urls requested, got 4, but max is: 3");
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_maps_to_server_error() {
        let (pipeline, _) = build_pipeline(|_| {});
        let response = respond(
            &pipeline,
            post(r#"{"urls":["http://a.test/","http://refuse.test/"]}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = error_body(response).await;
        assert_eq!(body.code, ErrorCode::UpstreamFailed);
        assert!(body.message.contains("http://refuse.test/"));
        assert!(!body.message.contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_distinguishable() {
        let (pipeline, _) = build_pipeline(|_| {});
        let response = respond(&pipeline, post(r#"{"urls":["http://hang.test/"]}"#)).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers().get(X_MUX_ERROR).unwrap(), "TARGET_TIMEOUT");

        let (pipeline, _) = build_pipeline(|c| {
            c.timeouts.target_timeout_ms = 10_000;
            c.timeouts.request_timeout_ms = 300;
        });
        let response = respond(&pipeline, post(r#"{"urls":["http://hang.test/"]}"#)).await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(response.headers().get(X_MUX_ERROR).unwrap(), "REQUEST_TIMEOUT");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_releases_slot_and_owes_no_body() {
        let (pipeline, calls) = build_pipeline(|_| {});
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = pipeline
            .handle(post(r#"{"urls":["http://hang.test/"]}"#), cancel)
            .await;
        assert!(matches!(outcome, PipelineOutcome::Abandoned));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.limiter().occupied(), 0);
    }
}
