//! Edge probing.
//!
//! # Data Flow
//! ```text
//! reference object on disk
//!     → checksum.rs (once per cycle)
//!
//! per edge:
//!     edge.rs (GET scheme://edge:port/path, Host header, retries)
//!     → outcome.rs (Latency | TimedOut | Failed{FetchFailed|VerifyFailed})
//!     → orchestrator/
//! ```

pub mod checksum;
pub mod edge;
pub mod outcome;

pub use checksum::{content_checksum, reference_checksum};
pub use edge::{HttpProbe, Prober, USER_AGENT};
pub use outcome::{FailKind, ProbeFailure, ProbeOutcome};
