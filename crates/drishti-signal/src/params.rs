//! The deterministic parameter matrix: (condition, quality) → exits and
//! sizing. Lookup is total over all 16 pairs.

use drishti_models::{MarketCondition, SetupQuality, TradeParams};

/// Per-band T1/T2 distances in index points.
const TARGETS: [(f64, f64); 4] = [
    (20.0, 35.0),   // QUIET
    (40.0, 70.0),   // NORMAL
    (80.0, 150.0),  // HIGH
    (150.0, 300.0), // EXTREME
];

/// Stop-loss points per (condition, quality). Tighter stops for better
/// setups, inside the per-band range.
const STOPS: [[f64; 4]; 4] = [
    // WEAK, MODERATE, STRONG, EXCELLENT
    [10.0, 10.0, 9.0, 8.0],   // QUIET
    [15.0, 15.0, 14.0, 13.0], // NORMAL
    [27.0, 26.0, 24.0, 22.0], // HIGH
    [50.0, 50.0, 48.0, 45.0], // EXTREME
];

/// Position multipliers. Zero rows are untradeable cells.
const MULTIPLIERS: [[f64; 4]; 4] = [
    [0.0, 0.0, 0.50, 1.00], // QUIET
    [0.0, 0.50, 1.00, 1.25], // NORMAL
    [0.0, 0.50, 1.00, 1.25], // HIGH
    [0.0, 0.0, 0.50, 1.00], // EXTREME
];

fn condition_row(c: MarketCondition) -> usize {
    match c {
        MarketCondition::Quiet => 0,
        MarketCondition::Normal => 1,
        MarketCondition::High => 2,
        MarketCondition::Extreme => 3,
    }
}

fn quality_col(q: SetupQuality) -> usize {
    match q {
        SetupQuality::Weak => 0,
        SetupQuality::Moderate => 1,
        SetupQuality::Strong => 2,
        SetupQuality::Excellent => 3,
    }
}

/// Look up the matrix cell.
pub fn lookup(condition: MarketCondition, quality: SetupQuality) -> TradeParams {
    let row = condition_row(condition);
    let col = quality_col(quality);
    let (t1, t2) = TARGETS[row];
    TradeParams {
        stop_loss_points: STOPS[row][col],
        target1_points: t1,
        target2_points: t2,
        position_multiplier: MULTIPLIERS[row][col],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_total() {
        for c in MarketCondition::ALL {
            for q in SetupQuality::ALL {
                let p = lookup(c, q);
                assert!(p.stop_loss_points > 0.0);
                assert!(p.target1_points > p.stop_loss_points);
                assert!(p.target2_points > p.target1_points);
            }
        }
    }

    #[test]
    fn weak_rows_never_size() {
        for c in MarketCondition::ALL {
            assert_eq!(lookup(c, SetupQuality::Weak).position_multiplier, 0.0);
        }
        assert_eq!(
            lookup(MarketCondition::Quiet, SetupQuality::Moderate).position_multiplier,
            0.0
        );
        assert_eq!(
            lookup(MarketCondition::Extreme, SetupQuality::Moderate).position_multiplier,
            0.0
        );
    }

    #[test]
    fn normal_strong_cell_matches_band() {
        let p = lookup(MarketCondition::Normal, SetupQuality::Strong);
        assert_eq!(p.stop_loss_points, 14.0);
        assert_eq!(p.target1_points, 40.0);
        assert_eq!(p.target2_points, 70.0);
        assert_eq!(p.position_multiplier, 1.0);
    }

    #[test]
    fn best_cells_cap_at_one_in_edge_bands() {
        assert_eq!(
            lookup(MarketCondition::Quiet, SetupQuality::Excellent).position_multiplier,
            1.0
        );
        assert_eq!(
            lookup(MarketCondition::Extreme, SetupQuality::Excellent).position_multiplier,
            1.0
        );
        assert_eq!(
            lookup(MarketCondition::High, SetupQuality::Excellent).position_multiplier,
            1.25
        );
    }
}
