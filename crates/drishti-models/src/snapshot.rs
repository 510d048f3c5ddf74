//! Persisted audit records and the in-memory active position.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FeatureVector;
use crate::plan::{Direction, MarketCondition, Prediction, SetupQuality, TradePlan};

/// Outcome of a single filter in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterStatus {
    Pass,
    Warn,
    Block,
}

impl FilterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Block => "BLOCK",
        }
    }
}

impl fmt::Display for FilterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter's verdict with its human-readable reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub name: String,
    pub status: FilterStatus,
    pub reason: String,
}

impl FilterResult {
    pub fn new(name: &str, status: FilterStatus, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            reason: reason.into(),
        }
    }
}

/// Resolution of a persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// Plan emitted, target/SL not yet reached.
    Pending,
    /// Target hit.
    Win,
    /// Stop-loss hit.
    Loss,
    /// Validity window elapsed with neither level touched.
    Expired,
    /// No plan this cadence (filter block or degraded inputs).
    Wait,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Expired => "EXPIRED",
            Self::Wait => "WAIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "WIN" => Some(Self::Win),
            "LOSS" => Some(Self::Loss),
            "EXPIRED" => Some(Self::Expired),
            "WAIT" => Some(Self::Wait),
            _ => None,
        }
    }

    /// Terminal outcomes can no longer be updated.
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full audit record of one cadence evaluation. Owned by the repository
/// after `put`; callers only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Repository-assigned id; 0 until persisted.
    pub id: i64,
    /// Epoch seconds, UTC.
    pub timestamp: i64,
    pub symbol: String,
    pub features: FeatureVector,
    pub condition: MarketCondition,
    pub quality: SetupQuality,
    pub prediction: Option<Prediction>,
    pub plan: Option<TradePlan>,
    pub filter_results: Vec<FilterResult>,
    pub outcome: Outcome,
    pub realized_pl: f64,
}

impl Snapshot {
    /// At most one BLOCK is recorded (the chain stops there), and a BLOCK
    /// always means no plan was emitted.
    pub fn filters_are_consistent(&self) -> bool {
        let blocks = self
            .filter_results
            .iter()
            .filter(|r| r.status == FilterStatus::Block)
            .count();
        blocks <= 1 && (blocks == 0 || self.plan.is_none())
    }
}

/// Lifecycle of the currently valid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Hold,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Hold => "HOLD",
            Self::Closed => "CLOSED",
        }
    }
}

/// Outcome notification fanned out to stream subscribers when the watcher
/// resolves the active plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    /// Security the resolved plan belongs to; subscribers filter on it.
    pub security_id: u32,
    pub outcome: Outcome,
    pub direction: Direction,
    /// LTP that triggered the resolution.
    pub price: f64,
}

/// The most recently emitted non-WAIT plan, held in memory by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivePosition {
    pub plan: TradePlan,
    pub condition: MarketCondition,
    pub snapshot_id: i64,
    /// Epoch seconds, UTC.
    pub emitted_at: i64,
    /// `emitted_at + level_validity_seconds`.
    pub valid_until: i64,
    pub status: PositionStatus,
    /// Set once by the outcome watcher; guards at-most-once updates.
    pub outcome_recorded: bool,
}

impl ActivePosition {
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.valid_until && self.status != PositionStatus::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_finality() {
        assert!(!Outcome::Pending.is_final());
        assert!(Outcome::Win.is_final());
        assert!(Outcome::Wait.is_final());
        for o in [
            Outcome::Pending,
            Outcome::Win,
            Outcome::Loss,
            Outcome::Expired,
            Outcome::Wait,
        ] {
            assert_eq!(Outcome::parse(o.as_str()), Some(o));
        }
    }

    #[test]
    fn block_implies_no_plan() {
        let snap = Snapshot {
            id: 0,
            timestamp: 0,
            symbol: "NIFTY".into(),
            features: FeatureVector::default(),
            condition: MarketCondition::Normal,
            quality: SetupQuality::Strong,
            prediction: None,
            plan: None,
            filter_results: vec![
                FilterResult::new("position_sizing", FilterStatus::Pass, "ok"),
                FilterResult::new("confidence", FilterStatus::Block, "below threshold"),
            ],
            outcome: Outcome::Wait,
            realized_pl: 0.0,
        };
        assert!(snap.filters_are_consistent());
    }
}
