//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, counts ≥ 1, ports valid)
//! - Check that the latency threshold is reachable before the timeout
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EdgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::time::Duration;

use crate::config::schema::EdgeConfig;

/// Longest accepted probe timeout.
const MAX_FETCH_TIMEOUT_SECS: f64 = 3600.0;

/// Longest accepted short judgement window (one week).
const MAX_WINDOW_SECS: u64 = 7 * 24 * 3600;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check every semantic rule, collecting all failures.
pub fn validate_config(config: &EdgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let probe = &config.probe;
    let decision = &config.decision;

    if probe.workers == 0 {
        errors.push(ValidationError::new("probe.workers", "must be at least 1"));
    }
    if probe.fetch_retry == 0 {
        errors.push(ValidationError::new("probe.fetch_retry", "must be at least 1"));
    }
    if !(probe.fetch_timeout_secs > 0.0 && Duration::try_from_secs_f64(probe.fetch_timeout_secs).is_ok()) {
        errors.push(ValidationError::new(
            "probe.fetch_timeout_secs",
            "must be a positive number of seconds",
        ));
    } else if probe.fetch_timeout_secs > MAX_FETCH_TIMEOUT_SECS {
        errors.push(ValidationError::new(
            "probe.fetch_timeout_secs",
            format!("must be at most {MAX_FETCH_TIMEOUT_SECS} seconds"),
        ));
    }
    if probe.scheme != "http" && probe.scheme != "https" {
        errors.push(ValidationError::new(
            "probe.scheme",
            format!("must be http or https, not {:?}", probe.scheme),
        ));
    }
    if probe.port == 0 {
        errors.push(ValidationError::new("probe.port", "must not be 0"));
    }
    if !probe.path.starts_with('/') {
        errors.push(ValidationError::new("probe.path", "must start with '/'"));
    }

    if !(decision.good_enough.is_finite() && decision.good_enough > 0.0) {
        errors.push(ValidationError::new(
            "decision.good_enough",
            "must be a positive number of seconds",
        ));
    } else if decision.good_enough >= probe.fetch_timeout_secs {
        errors.push(ValidationError::new(
            "decision.good_enough",
            format!(
                "must be below probe.fetch_timeout_secs ({})",
                probe.fetch_timeout_secs
            ),
        ));
    }
    if decision.edge_count == 0 {
        errors.push(ValidationError::new("decision.edge_count", "must be at least 1"));
    }
    for (dnet, count) in &decision.dnet_edge_count {
        if *count == 0 {
            errors.push(ValidationError::new(
                format!("decision.dnet_edge_count.{dnet}"),
                "must be at least 1",
            ));
        }
    }
    if decision.canary_killer == Some(0) {
        errors.push(ValidationError::new(
            "decision.canary_killer",
            "must be at least 1 when set",
        ));
    }
    if decision.window_secs == 0 {
        errors.push(ValidationError::new("decision.window_secs", "must be at least 1"));
    } else if decision.window_secs > MAX_WINDOW_SECS {
        errors.push(ValidationError::new(
            "decision.window_secs",
            format!("must be at most {MAX_WINDOW_SECS} seconds"),
        ));
    }
    if decision.fetch_history == 0 {
        errors.push(ValidationError::new("decision.fetch_history", "must be at least 1"));
    }

    for (dnet, zones) in &config.canaries {
        for (zone, edge) in zones {
            if edge.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("canaries.{dnet}.{zone}"),
                    "canary edge must not be empty",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
