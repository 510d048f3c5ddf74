//! The five-stage filter chain.
//!
//! Filters run in a fixed order and return tagged results; the chain stops
//! at the first BLOCK, so a snapshot never records more than one. Reasons
//! are preserved verbatim in the audit record.

use drishti_models::{
    idx, Direction, FeatureVector, FilterResult, FilterStatus, Prediction, SetupQuality,
    TradeParams,
};

/// Sizing and threshold knobs, from engine configuration.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub lot_size: u32,
    pub base_lots: u32,
    pub max_per_trade_loss: f64,
    pub max_daily_loss: f64,
}

/// Everything the chain reads for one evaluation.
#[derive(Debug)]
pub struct FilterContext<'a> {
    pub features: &'a FeatureVector,
    pub prediction: &'a Prediction,
    pub quality: SetupQuality,
    pub params: TradeParams,
    /// Effective adaptive threshold for this evaluation.
    pub confidence_threshold: f64,
    /// Realized P&L so far today (negative when losing).
    pub daily_realized_pl: f64,
    /// Stop-loss hits today among the last 10 snapshots.
    pub sl_hits_today: u32,
}

/// Confidence above which a counter-trend signal is tolerated (WARN).
const COUNTER_TREND_OVERRIDE: f64 = 72.0;

/// Run the chain. Returns the recorded results and whether a BLOCK fired.
pub fn run_chain(cfg: &FilterConfig, ctx: &FilterContext<'_>) -> (Vec<FilterResult>, bool) {
    let filters: [fn(&FilterConfig, &FilterContext<'_>) -> FilterResult; 5] = [
        position_sizing,
        confidence_threshold,
        trend_alignment,
        entry_quality,
        failure_detection,
    ];

    let mut results = Vec::with_capacity(filters.len());
    for f in filters {
        let r = f(cfg, ctx);
        let blocked = r.status == FilterStatus::Block;
        results.push(r);
        if blocked {
            return (results, true);
        }
    }
    (results, false)
}

fn position_sizing(cfg: &FilterConfig, ctx: &FilterContext<'_>) -> FilterResult {
    const NAME: &str = "position_sizing";

    if ctx.params.position_multiplier <= 0.0 {
        return FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!("no tradeable size for {} setup", ctx.quality),
        );
    }

    let lots = (cfg.base_lots as f64 * ctx.params.position_multiplier).floor();
    let worst_case = ctx.params.stop_loss_points * cfg.lot_size as f64 * lots;
    if worst_case > cfg.max_per_trade_loss {
        return FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!(
                "worst-case loss {:.0} exceeds per-trade cap {:.0}",
                worst_case, cfg.max_per_trade_loss
            ),
        );
    }

    if -ctx.daily_realized_pl >= cfg.max_daily_loss {
        return FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!(
                "daily loss {:.0} has reached cap {:.0}",
                -ctx.daily_realized_pl, cfg.max_daily_loss
            ),
        );
    }

    FilterResult::new(
        NAME,
        FilterStatus::Pass,
        format!("{} lots within caps", lots as u32),
    )
}

fn confidence_threshold(_cfg: &FilterConfig, ctx: &FilterContext<'_>) -> FilterResult {
    const NAME: &str = "confidence_threshold";
    let confidence = ctx.prediction.confidence;
    if confidence < ctx.confidence_threshold {
        FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!(
                "confidence {:.1} below adaptive threshold {:.1}",
                confidence, ctx.confidence_threshold
            ),
        )
    } else {
        FilterResult::new(
            NAME,
            FilterStatus::Pass,
            format!(
                "confidence {:.1} clears threshold {:.1}",
                confidence, ctx.confidence_threshold
            ),
        )
    }
}

fn trend_alignment(_cfg: &FilterConfig, ctx: &FilterContext<'_>) -> FilterResult {
    const NAME: &str = "trend_alignment";
    let trend = ctx.features.get(idx::TREND_15M);
    let wanted = ctx.prediction.direction.sign();

    if trend == 0.0 {
        FilterResult::new(NAME, FilterStatus::Warn, "15-minute trend is neutral")
    } else if trend == wanted {
        FilterResult::new(
            NAME,
            FilterStatus::Pass,
            format!("{} agrees with 15-minute trend", ctx.prediction.direction),
        )
    } else if ctx.prediction.confidence < COUNTER_TREND_OVERRIDE {
        FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!(
                "{} opposes 15-minute trend at confidence {:.1}",
                ctx.prediction.direction, ctx.prediction.confidence
            ),
        )
    } else {
        FilterResult::new(
            NAME,
            FilterStatus::Warn,
            "counter-trend tolerated on high confidence",
        )
    }
}

fn entry_quality(_cfg: &FilterConfig, ctx: &FilterContext<'_>) -> FilterResult {
    const NAME: &str = "entry_quality";
    let dist_atr = match ctx.prediction.direction {
        Direction::Buy => ctx.features.get(idx::DIST_SUPPORT_ATR),
        Direction::Sell => ctx.features.get(idx::DIST_RESISTANCE_ATR),
    };

    if dist_atr <= 0.5 {
        FilterResult::new(
            NAME,
            FilterStatus::Pass,
            format!("GOOD entry, {:.2} ATR from level", dist_atr),
        )
    } else if dist_atr <= 1.0 {
        FilterResult::new(
            NAME,
            FilterStatus::Warn,
            format!("FAIR entry, {:.2} ATR from level", dist_atr),
        )
    } else if ctx.quality == SetupQuality::Excellent {
        FilterResult::new(
            NAME,
            FilterStatus::Warn,
            format!("POOR entry ({:.2} ATR) tolerated on EXCELLENT setup", dist_atr),
        )
    } else {
        FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!("POOR entry, {:.2} ATR from nearest level", dist_atr),
        )
    }
}

fn failure_detection(_cfg: &FilterConfig, ctx: &FilterContext<'_>) -> FilterResult {
    const NAME: &str = "failure_detection";
    match ctx.sl_hits_today {
        0 | 1 => FilterResult::new(
            NAME,
            FilterStatus::Pass,
            format!("{} stop-loss hits today", ctx.sl_hits_today),
        ),
        2 => FilterResult::new(NAME, FilterStatus::Warn, "2 stop-loss hits today"),
        n => FilterResult::new(
            NAME,
            FilterStatus::Block,
            format!("{n} stop-loss hits today, standing down for the day"),
        ),
    }
}
