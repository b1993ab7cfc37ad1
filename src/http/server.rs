//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/api/mux` and `/health`
//! - Wire up middleware (request ID, tracing)
//! - Tie the inbound call's lifetime to a cancellation token
//!
//! # Design Decisions
//! - `/api/mux` accepts any method so the pipeline can name the wrong one
//! - `/health` bypasses admission

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::fanout::Upstream;
use crate::http::pipeline::{abandoned_response, PipelineOutcome, RequestPipeline};
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};

/// Path of the fan-out endpoint.
pub const MUX_PATH: &str = "/api/mux";

/// HTTP front end for a request pipeline.
pub struct HttpServer<U> {
    pipeline: Arc<RequestPipeline<U>>,
}

impl<U: Upstream> HttpServer<U> {
    pub fn new(pipeline: Arc<RequestPipeline<U>>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<RequestPipeline<U>> {
        &self.pipeline
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id());

        Router::new()
            .route(MUX_PATH, any(mux_handler::<U>))
            .route("/health", get(health_handler))
            .with_state(Arc::clone(&self.pipeline))
            .layer(middleware)
    }
}

async fn mux_handler<U: Upstream>(
    State(pipeline): State<Arc<RequestPipeline<U>>>,
    request: Request<Body>,
) -> Response {
    let cancel = CancellationToken::new();
    // Dropped with the handler future when the client goes away.
    let _disconnect = cancel.clone().drop_guard();

    match pipeline.handle(request, cancel).await {
        PipelineOutcome::Respond(response) => response,
        PipelineOutcome::Abandoned => abandoned_response(),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
