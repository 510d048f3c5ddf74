//! Trading-level generation: assembles the final plan from the matrix cell,
//! the feature vector, and the option chain.

use std::collections::BTreeMap;

use drishti_models::{
    idx, ChainSnapshot, Direction, FeatureVector, FilterResult, OptionType, Prediction,
    SetupQuality, TradeParams,
};
use drishti_models::{MarketCondition, TradePlan};
use drishti_options::{greeks, premium, GreeksInput};
use tracing::debug;

/// Inputs that do not vary per evaluation.
#[derive(Debug, Clone)]
pub struct LevelConfig {
    pub symbol: String,
    /// Listed strike spacing (NIFTY 50, SENSEX 100).
    pub strike_step: f64,
    pub lot_size: u32,
    pub base_lots: u32,
    /// Annualized risk-free rate for the premium fallback.
    pub risk_free_rate: f64,
    /// Time to expiry in years for the premium fallback.
    pub time_to_expiry_years: f64,
}

/// Fallback IV when the chain carries none.
const DEFAULT_IV: f64 = 0.12;

/// Entry snaps to a VWAP/CPR level only within this many ATRs of close.
const SNAP_ATR: f64 = 0.25;

/// Minimum usable premium after linearization.
const PREMIUM_FLOOR: f64 = 0.05;

/// Build a plan, or return None when the geometry fails the minimum
/// risk-reward (the caller records a WAIT).
#[allow(clippy::too_many_arguments)]
pub fn generate(
    cfg: &LevelConfig,
    fv: &FeatureVector,
    condition: MarketCondition,
    quality: SetupQuality,
    prediction: &Prediction,
    params: TradeParams,
    spot: f64,
    chain: Option<&ChainSnapshot>,
    filter_results: &[FilterResult],
) -> Option<TradePlan> {
    let direction = prediction.direction;
    let atr = fv.get(idx::ATR_14).max(1e-9);

    let entry = snap_entry(fv, spot, direction, atr);
    let (stoploss, target, target2) = match direction {
        Direction::Buy => (
            entry - params.stop_loss_points,
            entry + params.target1_points,
            entry + params.target2_points,
        ),
        Direction::Sell => (
            entry + params.stop_loss_points,
            entry - params.target1_points,
            entry - params.target2_points,
        ),
    };

    let risk = (entry - stoploss).abs();
    let reward = (target - entry).abs();
    if risk <= 0.0 {
        return None;
    }
    let risk_reward = reward / risk;
    if risk_reward < 1.0 {
        debug!(risk_reward, "plan rejected on risk-reward");
        return None;
    }

    let lots = (cfg.base_lots as f64 * params.position_multiplier).floor() as u32;

    let strike = nearest_strike(entry, cfg.strike_step);
    let option_type = match direction {
        Direction::Buy => OptionType::Ce,
        Direction::Sell => OptionType::Pe,
    };

    let iv = chain
        .map(|c| c.atm_iv() / 100.0)
        .filter(|v| *v > 0.0)
        .unwrap_or(DEFAULT_IV);
    let bs_input = GreeksInput {
        spot: entry,
        strike,
        time_to_expiry: cfg.time_to_expiry_years,
        risk_free_rate: cfg.risk_free_rate,
        iv,
        option_type,
    };

    // Entry premium from the live chain row mid when present; otherwise the
    // theoretical value.
    let premium_entry = chain
        .and_then(|c| c.row_at(strike))
        .and_then(|row| match option_type {
            OptionType::Ce => row.call_mid(),
            OptionType::Pe => row.put_mid(),
        })
        .unwrap_or_else(|| premium(&bs_input));

    // Exit premiums by delta-linearization around entry.
    let delta = greeks(&bs_input).delta;
    let premium_target = (premium_entry + delta * (target - entry)).max(PREMIUM_FLOOR);
    let premium_sl = (premium_entry + delta * (stoploss - entry)).max(PREMIUM_FLOOR);

    let projected_pl = (premium_target - premium_entry) * cfg.lot_size as f64 * lots as f64;

    let filters_status: BTreeMap<String, _> = filter_results
        .iter()
        .map(|r| (r.name.clone(), r.status))
        .collect();

    let rationale = format!(
        "{direction} in {condition}/{quality}: confidence {:.1}, SL {:.0} pts, T1 {:.0} pts, {:.2} ATR headroom",
        prediction.confidence,
        params.stop_loss_points,
        params.target1_points,
        match direction {
            Direction::Buy => fv.get(idx::DIST_RESISTANCE_ATR),
            Direction::Sell => fv.get(idx::DIST_SUPPORT_ATR),
        },
    );

    Some(TradePlan {
        symbol: cfg.symbol.clone(),
        direction,
        entry,
        target,
        target2,
        stoploss,
        risk_reward,
        position_size_lots: lots,
        strike,
        option_type,
        premium_entry,
        premium_target,
        premium_sl,
        projected_pl,
        filters_status,
        rationale,
    })
}

/// Entry is the current close, unless a VWAP or CPR level sits between the
/// close and the trade direction within `SNAP_ATR` ATRs; then entry waits at
/// that level.
fn snap_entry(fv: &FeatureVector, spot: f64, direction: Direction, atr: f64) -> f64 {
    let cpr_tc = fv.get(idx::CPR_TC);
    let cpr_bc = cpr_tc - fv.get(idx::CPR_WIDTH);
    let candidates = [fv.get(idx::VWAP), fv.get(idx::CPR_PIVOT), cpr_tc, cpr_bc];

    let limit = SNAP_ATR * atr;
    let mut best = spot;
    let mut best_dist = f64::MAX;
    for level in candidates {
        if level <= 0.0 {
            continue;
        }
        let ahead = match direction {
            Direction::Buy => level > spot,
            Direction::Sell => level < spot,
        };
        let dist = (level - spot).abs();
        if ahead && dist <= limit && dist < best_dist {
            best = level;
            best_dist = dist;
        }
    }
    best
}

/// ATM strike: round to the nearest listed multiple.
pub fn nearest_strike(price: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return price;
    }
    (price / step).round() * step
}
