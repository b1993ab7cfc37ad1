//! Startup, serving and drain.
//!
//! # Responsibilities
//! - Build the pipeline and router from an immutable config
//! - Bind the listener; failure is fatal
//! - Accept connections with a header read deadline of `request_timeout`
//! - Serve until shutdown, then drain within `drain_timeout_secs`

use std::sync::Arc;
use std::time::Duration;

use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::MuxConfig;
use crate::fanout::{HttpUpstream, Upstream};
use crate::http::{HttpServer, RequestPipeline};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;

/// Pause after a failed accept so a persistent error (EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("in-flight requests did not drain within {0:?}")]
    ForcedShutdown(Duration),

    #[error("failed to build outbound client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Owns the server for its whole life.
pub struct LifecycleManager<U = HttpUpstream> {
    config: MuxConfig,
    server: HttpServer<U>,
}

impl LifecycleManager<HttpUpstream> {
    pub fn new(config: MuxConfig) -> Result<Self, LifecycleError> {
        let upstream = HttpUpstream::new(&config.concurrency_budget())?;
        Ok(Self::with_upstream(config, upstream))
    }
}

impl<U: Upstream> LifecycleManager<U> {
    pub fn with_upstream(config: MuxConfig, upstream: U) -> Self {
        let pipeline = Arc::new(RequestPipeline::new(&config, upstream));
        Self {
            server: HttpServer::new(pipeline),
            config,
        }
    }

    /// Bind, install signal handlers and serve until a termination signal.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let address = self.config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| LifecycleError::Bind { address, source })?;

        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            signals::wait_for_termination().await;
            shutdown.trigger();
        });

        self.serve(listener, shutdown_rx).await
    }

    /// Serve on `listener` until `shutdown_rx` fires, then drain.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), LifecycleError> {
        let addr = listener.local_addr().map_err(LifecycleError::Serve)?;
        let drain_timeout = Duration::from_secs(self.config.shutdown.drain_timeout_secs);
        let limiter = Arc::clone(self.server.pipeline().limiter());
        let concurrency = self.config.concurrency_budget();
        let timeouts = self.config.timeout_budget();

        tracing::info!(
            address = %addr,
            max_inbound_connections = concurrency.max_inbound_connections,
            max_targets_per_request = concurrency.max_targets_per_request,
            max_outbound_per_request = concurrency.max_outbound_per_request,
            target_timeout = ?timeouts.target_timeout,
            request_timeout = ?timeouts.request_timeout,
            "HTTP server starting"
        );

        let mut builder = AutoBuilder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.request_timeout);
        let service = TowerToHyperService::new(self.server.router());
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let conn = builder
                        .serve_connection(TokioIo::new(stream), service.clone())
                        .into_owned();
                    let conn = graceful.watch(conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }
                // A closed channel also means nobody can ask us to keep running.
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown requested, draining in-flight requests");
                    break;
                }
            }
        }

        drop(listener);

        match tokio::time::timeout(drain_timeout, graceful.shutdown()).await {
            Ok(()) => {
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            Err(_) => {
                tracing::error!(
                    in_flight = limiter.occupied(),
                    drain_timeout = ?drain_timeout,
                    "Drain deadline elapsed, forcing shutdown"
                );
                Err(LifecycleError::ForcedShutdown(drain_timeout))
            }
        }
    }
}
