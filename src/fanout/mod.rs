//! Fan-out subsystem.
//!
//! # Data Flow
//! ```text
//! validated target list
//!     → engine.rs (split into chunks, one task per target, drain each chunk)
//!     → upstream.rs (one outbound call per target)
//!     → types.rs (TargetOutcome per target, FanoutResult or FanoutError)
//! ```
//!
//! # Design Decisions
//! - All-or-nothing: a single failed target fails the whole batch
//! - Chunks are strictly sequential; peak concurrency equals the chunk size
//! - Per-target timeouts are distinct from the whole-request timeout

pub mod engine;
pub mod types;
pub mod upstream;

pub use engine::FanoutEngine;
pub use types::{FailureReason, FanoutError, FanoutResult, TargetOutcome, TargetResponse};
pub use upstream::{HttpUpstream, Upstream};
