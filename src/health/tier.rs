//! Judgement tiers and the operator-facing labels stored on each edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of judging one edge, strongest signal first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// The freshest sample is under the threshold.
    PassThreshold,
    /// The short-window average is under the threshold.
    PassWindow,
    /// The retained average is under the threshold.
    PassAverage,
    /// Nothing confirms goodness, but the edge did not time out.
    #[default]
    Pass,
    Fail,
}

impl Tier {
    /// Every tier, strongest first.
    pub const ALL: [Tier; 5] = [
        Tier::PassThreshold,
        Tier::PassWindow,
        Tier::PassAverage,
        Tier::Pass,
        Tier::Fail,
    ];

    /// Tiers eligible to fill live slots, in preference order.
    pub const FILL_ORDER: [Tier; 4] = [
        Tier::PassThreshold,
        Tier::PassWindow,
        Tier::PassAverage,
        Tier::Pass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::PassThreshold => "pass_threshold",
            Tier::PassWindow => "pass_window",
            Tier::PassAverage => "pass_average",
            Tier::Pass => "pass",
            Tier::Fail => "fail",
        }
    }

    /// Any tier other than `fail`.
    pub fn is_passing(self) -> bool {
        self != Tier::Fail
    }

    /// Canaries are used only when judged `pass` or `pass_window`.
    pub fn is_canary_eligible(self) -> bool {
        matches!(self, Tier::Pass | Tier::PassWindow)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator override on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Available,
    /// Live whenever its judgement is not `fail`.
    Force,
    /// Live regardless of judgement.
    Blindforce,
    /// Probed and recorded but never judged.
    Unavailable,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Available => "available",
            Mode::Force => "force",
            Mode::Blindforce => "blindforce",
            Mode::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an edge is currently advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveState {
    In,
    #[default]
    Out,
}

impl fmt::Display for LiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LiveState::In => "in",
            LiveState::Out => "out",
        })
    }
}

/// A label string that does not name a known value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} must be one of {expected}, not {value:?}")]
pub struct LabelError {
    pub kind: &'static str,
    pub expected: &'static str,
    pub value: String,
}

impl FromStr for Tier {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| LabelError {
                kind: "health",
                expected: "pass_threshold, pass_window, pass_average, pass, fail",
                value: s.to_string(),
            })
    }
}

impl FromStr for Mode {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Mode::Available),
            "force" => Ok(Mode::Force),
            "blindforce" => Ok(Mode::Blindforce),
            "unavailable" => Ok(Mode::Unavailable),
            _ => Err(LabelError {
                kind: "mode",
                expected: "available, force, blindforce, unavailable",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LiveState {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(LiveState::In),
            "out" => Ok(LiveState::Out),
            _ => Err(LabelError {
                kind: "state",
                expected: "in, out",
                value: s.to_string(),
            }),
        }
    }
}

/// Count of edges per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tally {
    counts: [usize; 5],
}

impl Tally {
    pub fn add(&mut self, tier: Tier) {
        self.counts[tier.index()] += 1;
    }

    pub fn get(&self, tier: Tier) -> usize {
        self.counts[tier.index()]
    }

    pub fn failures(&self) -> usize {
        self.get(Tier::Fail)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tier, usize)> + '_ {
        Tier::ALL.into_iter().map(|tier| (tier, self.get(tier)))
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (tier, count)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{tier}={count}")?;
        }
        Ok(())
    }
}
