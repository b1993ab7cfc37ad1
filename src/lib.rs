//! HTTP fan-out multiplexer library.

pub mod config;
pub mod fanout;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::MuxConfig;
pub use fanout::{FanoutEngine, HttpUpstream, Upstream};
pub use http::{HttpServer, RequestPipeline};
pub use lifecycle::{LifecycleError, LifecycleManager, Shutdown};
