//! Cycle lifecycle.
//!
//! # Data Flow
//! ```text
//! main.rs
//!     → runner.rs run_cycle (cycle span with run id)
//!         → lock.rs (flock on the lockfile, released on drop)
//!         → probe → orchestrator → selection
//!         → publish.rs (zone manifests, or log lines in dry run)
//!     → CycleReport
//! ```
//!
//! # Design Decisions
//! - One process runs one cycle for one dnet and exits; cron provides the cadence
//! - Fail fast: lock, config inputs and run state errors abort before probing
//! - No partial run state: it is written once, at the end

pub mod lock;
pub mod publish;
pub mod runner;

pub use lock::CycleLock;
pub use publish::{LogPublisher, ManifestPublisher, ZoneManifest, ZonePublisher};
pub use runner::{run_cycle, run_cycle_with, CycleOptions, CycleReport};
