//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, apply SIMPLE_HTTP_MUX_* overrides)
//!     → validation.rs (semantic checks)
//!     → MuxConfig (validated, immutable)
//!     → budgets handed to the limiter, engine and pipeline at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no process-wide global
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{resolve_config, resolve_config_with, ConfigError};
pub use schema::{ConcurrencyBudget, ListenerConfig, LogFormat, MuxConfig, TimeoutBudget};
pub use validation::{validate_config, ValidationError};
