//! Tagged result of one edge probe.

use std::fmt;

use thiserror::Error;

/// Why a probe that got an HTTP answer is still a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailKind {
    /// Non-2xx status (or the body could not be read).
    FetchFailed,
    /// The body does not match the reference checksum.
    VerifyFailed,
}

impl fmt::Display for FailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailKind::FetchFailed => "fetch_failed",
            FailKind::VerifyFailed => "verify_failed",
        })
    }
}

/// A failed fetch or verification against one edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} on {edge}: {reason}")]
pub struct ProbeFailure {
    pub kind: FailKind,
    pub edge: String,
    /// Response body for fetch failures, observed checksum for verify failures.
    pub reason: String,
}

/// What one probe observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// Content verified; round-trip latency in seconds.
    Latency(f64),
    /// Timed out, or could not connect within the retry budget.
    TimedOut,
    Failed(ProbeFailure),
}

impl ProbeOutcome {
    /// The sample to record: measured latency, or `timeout_secs` for anything
    /// that must not count as healthy.
    pub fn sample(&self, timeout_secs: f64) -> f64 {
        match self {
            ProbeOutcome::Latency(secs) => *secs,
            ProbeOutcome::TimedOut | ProbeOutcome::Failed(_) => timeout_secs,
        }
    }

    pub fn is_verify_failure(&self) -> bool {
        matches!(
            self,
            ProbeOutcome::Failed(ProbeFailure {
                kind: FailKind::VerifyFailed,
                ..
            })
        )
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Latency(_) => "ok",
            ProbeOutcome::TimedOut => "timeout",
            ProbeOutcome::Failed(failure) => match failure.kind {
                FailKind::FetchFailed => "fetch_failed",
                FailKind::VerifyFailed => "verify_failed",
            },
        }
    }
}
