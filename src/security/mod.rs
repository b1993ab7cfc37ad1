//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → admission.rs (take an inbound slot or reject with 429)
//!     → limits.rs (check method, body size, read deadline)
//!     → Pass to the fan-out pipeline
//! ```
//!
//! # Design Decisions
//! - Reject instead of queue: overload is signalled, not absorbed
//! - Fail closed: reject on any limit violation
//! - No trust in client input

pub mod admission;
pub mod limits;

pub use admission::{AdmissionLimiter, AdmissionSlot};
pub use limits::LimitError;
