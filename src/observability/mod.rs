//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, one `cycle` span per run)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (human-readable or JSON lines)
//!     → Prometheus textfile, rewritten at the end of each cycle
//! ```
//!
//! # Design Decisions
//! - Every log line inside a cycle carries the dnet and run id
//! - Metrics are cheap and a no-op unless a textfile is configured

pub mod logging;
pub mod metrics;
