//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EdgeConfig (validated, immutable)
//!     → threaded by reference into probe, orchestrator and selector
//!
//! Per-dnet inputs (inputs.rs):
//!     edge list file → Vec<String>
//!     zone templates → zone name → mtime
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a cycle never sees it change
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod inputs;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::DecisionConfig;
pub use schema::EdgeConfig;
pub use schema::ObservabilityConfig;
pub use schema::PathsConfig;
pub use schema::ProbeConfig;
