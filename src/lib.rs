//! Edge health probing and live-set selection.

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod orchestrator;
pub mod probe;
pub mod resilience;
pub mod selection;
pub mod store;

pub use config::schema::EdgeConfig;
pub use error::{CycleError, StoreError};
pub use lifecycle::{run_cycle, CycleOptions, CycleReport};
