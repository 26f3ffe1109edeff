//! Durable storage.
//!
//! # Layout
//! ```text
//! <healthdata_store>/<edge>.edgestore   one EdgeHealthRecord per edge
//! <state_dir>/<dnet>.state.json         one RunState per dnet
//! ```
//!
//! # Design Decisions
//! - Plain JSON so monitoring checks can read the stores directly
//! - Every write is write-temp-then-rename (atomic.rs)
//! - Per-edge files mean different edges and dnets never contend

pub mod atomic;
pub mod records;
pub mod run_state;

pub use records::{load_records, LoadedRecords};
pub use run_state::RunState;
