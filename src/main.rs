//! HTTP fan-out multiplexer.
//!
//! ```text
//!  POST /api/mux {"urls": [...]}
//!        │
//!        ▼
//!  ┌───────────┐   429 + Retry-After
//!  │ admission │──────────────────────▶
//!  └─────┬─────┘
//!        ▼
//!  ┌───────────┐   400 / 413 / 408
//!  │  limits + │──────────────────────▶
//!  │ validation│
//!  └─────┬─────┘
//!        ▼
//!  ┌───────────┐   chunk 1 ─▶ [t1 t2 .. tk]   (wait for all)
//!  │  fan-out  │   chunk 2 ─▶ [..]            (first failure stops the batch)
//!  │  engine   │   ...
//!  └─────┬─────┘
//!        ▼
//!  200 {"responses": [...]} in input order
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_multiplexer::config::{resolve_config, validate_config, ConfigError};
use http_multiplexer::lifecycle::LifecycleManager;
use http_multiplexer::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "http-multiplexer")]
#[command(about = "Fans one request out to many HTTP targets", long_about = None)]
struct CliArgs {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let mut config = resolve_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "http-multiplexer starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address, metrics disabled"
            ),
        }
    }

    LifecycleManager::new(config)?.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
