//! Probe orchestration for one decision cycle.
//!
//! # Data Flow
//! ```text
//! edge list + canary edges
//!     → cycle.rs (one task per edge, `workers` in flight)
//!     → join_next(): completion order
//!         → EdgeHealthRecord::add_value
//!         → main judge | canary judge | neither (unavailable)
//!         → canary.rs (kill-switch check after each canary result)
//!     → CycleProbes (both judges classified, verification failures)
//! ```
//!
//! # Design Decisions
//! - Only the consumption loop touches records and judges, so neither needs a lock
//! - Cancellation is checked before a canary probe starts; in-flight probes
//!   finish and their results are still recorded
//! - The prober is a trait so cycles can be driven without a network

pub mod canary;
pub mod cycle;

pub use canary::CanaryKillSwitch;
pub use cycle::{CycleProbes, OrchestratorSettings, ProbeOrchestrator};
