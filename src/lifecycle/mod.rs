//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (manager.rs):
//!     Config → Build pipeline → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Bind failure is fatal
//! - Drain has its own deadline, independent of request timeouts
//! - A drain that misses its deadline is an error, not a clean exit

pub mod manager;
pub mod shutdown;
pub mod signals;

pub use manager::{LifecycleError, LifecycleManager};
pub use shutdown::Shutdown;
