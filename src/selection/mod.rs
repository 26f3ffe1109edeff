//! Live-set selection and zone rewrite planning.
//!
//! # Data Flow
//! ```text
//! main judge + canary judge + RunState + record modes
//!     → selector.rs (live set, per-zone canary, changed flag)
//!     → selector.rs stamp (health + in/out persisted per record)
//!     → zones.rs (zones to rewrite, given template mtimes)
//!     → lifecycle/publish.rs
//! ```
//!
//! # Design Decisions
//! - An unchanged, still-healthy live set is returned as-is so downstream
//!   outputs are not rewritten every cycle
//! - Canary changes are tracked per zone, separately from the live-set flag
//! - Falling back to the previous set never counts as a change

pub mod selector;
pub mod zones;

pub use selector::{Admission, LiveSetSelector, Selection};
pub use zones::{plan_zone_writes, WriteReason, ZoneWrite};
