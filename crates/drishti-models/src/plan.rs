//! Classification enums, matrix parameters, predictions, and trade plans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::snapshot::FilterStatus;

/// Prevailing volatility regime, derived purely from the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketCondition {
    Quiet,
    Normal,
    High,
    Extreme,
}

impl MarketCondition {
    pub const ALL: [MarketCondition; 4] = [Self::Quiet, Self::Normal, Self::High, Self::Extreme];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiet => "QUIET",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Setup quality bucket from the weighted layer scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SetupQuality {
    Weak,
    Moderate,
    Strong,
    Excellent,
}

impl SetupQuality {
    pub const ALL: [SetupQuality; 4] = [Self::Weak, Self::Moderate, Self::Strong, Self::Excellent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weak => "WEAK",
            Self::Moderate => "MODERATE",
            Self::Strong => "STRONG",
            Self::Excellent => "EXCELLENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|q| q.as_str() == s)
    }
}

impl fmt::Display for SetupQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction on the spot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }

    /// +1 for BUY, -1 for SELL.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option leg type. CE rides a BUY on spot, PE a SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Ce,
    Pe,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ce => "CE",
            Self::Pe => "PE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CE" => Some(Self::Ce),
            "PE" => Some(Self::Pe),
            _ => None,
        }
    }
}

/// What the engine tells callers to do this cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Trade,
    Hold,
    Wait,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "TRADE",
            Self::Hold => "HOLD",
            Self::Wait => "WAIT",
        }
    }
}

/// One matrix cell: exit distances and the sizing multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    pub stop_loss_points: f64,
    pub target1_points: f64,
    pub target2_points: f64,
    pub position_multiplier: f64,
}

/// Model output on one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub direction: Direction,
    /// Percent, `100 · max(up_prob, down_prob)`.
    pub confidence: f64,
    pub up_prob: f64,
    pub down_prob: f64,
}

/// The single actionable output of a cadence evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub symbol: String,
    pub direction: Direction,
    pub entry: f64,
    pub target: f64,
    /// Extended target from the matrix, exposed for runners who scale out.
    pub target2: f64,
    pub stoploss: f64,
    pub risk_reward: f64,
    pub position_size_lots: u32,
    pub strike: f64,
    pub option_type: OptionType,
    pub premium_entry: f64,
    pub premium_target: f64,
    pub premium_sl: f64,
    pub projected_pl: f64,
    /// Verbatim filter outcomes, keyed by filter name in evaluation order.
    pub filters_status: BTreeMap<String, FilterStatus>,
    pub rationale: String,
}

impl TradePlan {
    /// Geometry sanity: SL on the loss side, target on the profit side.
    pub fn levels_are_ordered(&self) -> bool {
        match self.direction {
            Direction::Buy => self.stoploss < self.entry && self.entry < self.target,
            Direction::Sell => self.target < self.entry && self.entry < self.stoploss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_string_round_trip() {
        for c in MarketCondition::ALL {
            assert_eq!(MarketCondition::parse(c.as_str()), Some(c));
        }
        for q in SetupQuality::ALL {
            assert_eq!(SetupQuality::parse(q.as_str()), Some(q));
        }
        assert_eq!(Direction::parse("BUY"), Some(Direction::Buy));
        assert_eq!(OptionType::parse("PE"), Some(OptionType::Pe));
    }

    #[test]
    fn plan_geometry_check() {
        let plan = TradePlan {
            symbol: "NIFTY".into(),
            direction: Direction::Buy,
            entry: 100.0,
            target: 110.0,
            target2: 120.0,
            stoploss: 95.0,
            risk_reward: 2.0,
            position_size_lots: 1,
            strike: 100.0,
            option_type: OptionType::Ce,
            premium_entry: 50.0,
            premium_target: 55.0,
            premium_sl: 47.5,
            projected_pl: 325.0,
            filters_status: BTreeMap::new(),
            rationale: String::new(),
        };
        assert!(plan.levels_are_ordered());

        let inverted = TradePlan {
            stoploss: 105.0,
            ..plan
        };
        assert!(!inverted.levels_are_ordered());
    }
}
