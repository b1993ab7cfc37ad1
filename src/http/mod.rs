//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → pipeline.rs (admission, limits, validation, fan-out)
//!     → request.rs (decode and validate the URL list)
//!     → response.rs (serialize result or error)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{PipelineError, PipelineOutcome, RequestPipeline};
pub use request::{MakeRequestUuid, MuxRequest, X_REQUEST_ID};
pub use response::{ErrorBody, ErrorCode, MuxResponse, ServiceResponse, X_MUX_ERROR};
pub use server::{HttpServer, MUX_PATH};
