//! Resilience helpers for edge probes.
//!
//! # Data Flow
//! ```text
//! Probe attempt fails to connect
//!     → backoff.rs (jittered delay before the next attempt)
//!     → attempts exhausted: probe reports a timeout
//! ```
//!
//! # Design Decisions
//! - Only connection failures are retried; an HTTP answer is final
//! - Timeouts are never retried; the timeout itself is the measurement
//! - Jitter spreads retries across edges that failed together

pub mod backoff;

pub use backoff::retry_delay;
