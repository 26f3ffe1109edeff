//! Edge health subsystem.
//!
//! # Data Flow
//! ```text
//! Probe result (probe/)
//!     → record.rs (append to bounded time series, persist)
//!
//! Decision time:
//!     records + threshold
//!     → judge.rs (tier per edge, tally per pool)
//!     → selection/ (live set)
//! ```
//!
//! # Design Decisions
//! - One record per edge, one file per record; no cross-edge contention
//! - Two independent judges per cycle: main pool and canary pool
//! - Tiers are ranked by signal strength, freshest first

pub mod judge;
pub mod record;
pub mod tier;
pub mod timestamp;

pub use judge::HealthJudge;
pub use record::{EdgeHealthRecord, RecordOptions, FETCH_HISTORY};
pub use tier::{LiveState, Mode, Tally, Tier};
pub use timestamp::Timestamp;
