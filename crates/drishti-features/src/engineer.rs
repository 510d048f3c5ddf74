//! The feature engineer: 74 named slots from a candle window plus side
//! inputs (previous-day levels, cached option chain, failure context).
//!
//! Derivations never look ahead: every slot is computed from bars at or
//! before the evaluation bar. Undefined indicator values become the 0.0
//! sentinel; option slots fall back to the most recent cached chain and to
//! sentinels (with `feature_stale` set) once that cache ages past the
//! staleness window.

use drishti_models::{idx, Candle, ChainSnapshot, EngineError, FeatureVector};

use crate::indicators as ind;

/// Minimum candle window for a full vector.
pub const MIN_WINDOW: usize = 200;

/// Swing high/low lookback, in bars.
const SR_WINDOW: usize = 20;

/// Realized-range percentile lookback (one trading day of 5-minute bars).
const RANGE_WINDOW: usize = 78;

/// Option-chain snapshots older than this are sentinel-ed out.
pub const CHAIN_STALE_SECS: i64 = 300;

/// Market session open, minutes after IST midnight (09:15).
const SESSION_OPEN_MIN: i64 = 9 * 60 + 15;

/// Side inputs that change once per day or per cadence, not per bar.
#[derive(Debug, Clone, Default)]
pub struct DayContext {
    /// Previous trading day's high/low/close, for the CPR band.
    pub prev_day_high: f64,
    pub prev_day_low: f64,
    pub prev_day_close: f64,
    /// Cached historical support/resistance levels (absolute prices).
    pub historical_levels: Vec<f64>,
    /// Stop-loss hits recorded so far today.
    pub sl_hits_today: u32,
    /// True while the failure-detection cooldown is active.
    pub failure_window: bool,
}

/// Stateful engineer: owns the option-chain cache and the forward-fill
/// buffer for microstructure slots.
#[derive(Debug, Default)]
pub struct FeatureEngineer {
    cached_chain: Option<ChainSnapshot>,
    last_micro: Option<[f64; 10]>,
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached option chain after a successful fetch.
    pub fn set_chain(&mut self, chain: ChainSnapshot) {
        self.cached_chain = Some(chain);
    }

    pub fn chain(&self) -> Option<&ChainSnapshot> {
        self.cached_chain.as_ref()
    }

    /// Compute the full vector for the given window (oldest first).
    ///
    /// `now_utc` is the evaluation instant used only for option-chain
    /// staleness; all price-derived slots depend on the window alone, so the
    /// engineer stays pure per (window, cache, context).
    pub fn compute(
        &mut self,
        candles: &[Candle],
        ctx: &DayContext,
        now_utc: i64,
    ) -> Result<FeatureVector, EngineError> {
        if candles.len() < MIN_WINDOW {
            return Err(EngineError::InsufficientData {
                have: candles.len(),
                need: MIN_WINDOW,
            });
        }

        let mut fv = FeatureVector::default();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let last = candles[candles.len() - 1];
        let close = last.close;

        self.trend_features(&mut fv, candles, &closes);
        self.volatility_features(&mut fv, candles, &closes);
        let atr = fv.get(idx::ATR_14).max(1e-9);
        self.cpr_features(&mut fv, ctx, close, atr);
        self.vwap_features(&mut fv, candles, close, atr);
        self.sr_features(&mut fv, candles, ctx, close, atr);
        self.micro_features(&mut fv, candles, ctx);
        self.options_features(&mut fv, now_utc);
        self.time_features(&mut fv, last.time);
        self.aggregate_features(&mut fv, candles, ctx, close, atr);

        debug_assert!(fv.is_finite());
        Ok(fv)
    }

    fn trend_features(&self, fv: &mut FeatureVector, candles: &[Candle], closes: &[f64]) {
        let close = *closes.last().unwrap_or(&0.0);
        let sent = |v: Option<f64>| v.unwrap_or(0.0);

        let ema5 = sent(ind::ema(closes, 5));
        let ema20 = sent(ind::ema(closes, 20));
        let ema50 = sent(ind::ema(closes, 50));
        let ema200 = sent(ind::ema(closes, 200));
        fv.set(idx::EMA_5, ema5);
        fv.set(idx::EMA_12, sent(ind::ema(closes, 12)));
        fv.set(idx::EMA_20, ema20);
        fv.set(idx::EMA_50, ema50);
        fv.set(idx::EMA_200, ema200);
        fv.set(idx::RSI_14, ind::rsi(closes, 14).unwrap_or(50.0));
        fv.set(idx::RSI_5, ind::rsi(closes, 5).unwrap_or(50.0));

        if let Some(m) = ind::macd(closes, 12, 26, 9) {
            fv.set(idx::MACD, m.line);
            fv.set(idx::MACD_SIGNAL, m.signal);
            fv.set(idx::MACD_HIST, m.histogram);
        }
        fv.set(idx::ADX, sent(ind::adx(candles, 14)));

        let alignment = if ema5 > ema20 && ema20 > ema50 {
            1.0
        } else if ema5 < ema20 && ema20 < ema50 {
            -1.0
        } else {
            0.0
        };
        fv.set(idx::EMA_ALIGNMENT, alignment);
        fv.set(
            idx::TREND_REGIME,
            if close >= ema200 { 1.0 } else { -1.0 },
        );

        let n = closes.len();
        if n > 10 && closes[n - 11] != 0.0 {
            fv.set(
                idx::MOMENTUM_10,
                (close - closes[n - 11]) / closes[n - 11] * 100.0,
            );
        }
    }

    fn volatility_features(&self, fv: &mut FeatureVector, candles: &[Candle], closes: &[f64]) {
        fv.set(idx::ATR_14, ind::atr(candles, 14).unwrap_or(0.0));
        fv.set(idx::PARKINSON_20, ind::parkinson(candles, 20).unwrap_or(0.0));
        fv.set(
            idx::GARMAN_KLASS_20,
            ind::garman_klass(candles, 20).unwrap_or(0.0),
        );
        fv.set(idx::RETURNS_STD_5, ind::returns_std(closes, 5).unwrap_or(0.0));
        fv.set(
            idx::RETURNS_STD_20,
            ind::returns_std(closes, 20).unwrap_or(0.0),
        );

        let atrs = ind::atr_series(candles, 14);
        if atrs.len() > 20 {
            let tail = &atrs[atrs.len() - 20..];
            fv.set(idx::VOL_OF_VOL, ind::std_dev(tail).unwrap_or(0.0));
            fv.set(idx::VOL_OF_VOL_Z, ind::zscore_last(&atrs, 20).unwrap_or(0.0));
        }

        let n = candles.len();
        if n >= RANGE_WINDOW {
            let ranges: Vec<f64> = candles[n - RANGE_WINDOW..].iter().map(|c| c.range()).collect();
            let current = candles[n - 1].range();
            fv.set(
                idx::RANGE_PCTILE_78,
                ind::percentile_rank(&ranges, current).unwrap_or(0.0),
            );
        }
    }

    fn cpr_features(&self, fv: &mut FeatureVector, ctx: &DayContext, close: f64, atr: f64) {
        if ctx.prev_day_high <= 0.0 || ctx.prev_day_low <= 0.0 {
            return;
        }
        let pivot = (ctx.prev_day_high + ctx.prev_day_low + ctx.prev_day_close) / 3.0;
        let bc = (ctx.prev_day_high + ctx.prev_day_low) / 2.0;
        let tc = (pivot - bc) + pivot;
        let (tc, bc) = if tc >= bc { (tc, bc) } else { (bc, tc) };

        fv.set(idx::CPR_PIVOT, pivot);
        fv.set(idx::CPR_TC, tc);
        fv.set(idx::CPR_WIDTH, tc - bc);
        fv.set(idx::CPR_DIST_PIVOT_ATR, (close - pivot) / atr);
        fv.set(idx::CPR_DIST_TC_ATR, (close - tc) / atr);
        fv.set(idx::CPR_DIST_BC_ATR, (close - bc) / atr);
    }

    fn vwap_features(&self, fv: &mut FeatureVector, candles: &[Candle], close: f64, atr: f64) {
        let session_start = session_open(candles[candles.len() - 1].time);
        if let Some(vwap) = ind::session_vwap(candles, session_start) {
            fv.set(idx::VWAP, vwap);
            fv.set(idx::VWAP_DIST_ATR, (close - vwap) / atr);

            // Slope: VWAP now vs VWAP three bars ago, per bar.
            if candles.len() > 3 {
                let earlier = &candles[..candles.len() - 3];
                if let Some(prev) = ind::session_vwap(earlier, session_start) {
                    fv.set(idx::VWAP_SLOPE, (vwap - prev) / 3.0);
                }
            }
        }
    }

    fn sr_features(
        &self,
        fv: &mut FeatureVector,
        candles: &[Candle],
        ctx: &DayContext,
        close: f64,
        atr: f64,
    ) {
        let n = candles.len();
        let tail = &candles[n - SR_WINDOW..];
        let swing_high = tail.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let swing_low = tail.iter().map(|c| c.low).fold(f64::MAX, f64::min);

        let resistance_touches = tail
            .iter()
            .filter(|c| c.high >= swing_high * 0.999)
            .count() as f64;
        let support_touches = tail.iter().filter(|c| c.low <= swing_low * 1.001).count() as f64;

        // Nearest barrier: swing level or any cached historical level on the
        // relevant side of price.
        let mut resistance = swing_high.max(close);
        for lvl in ctx.historical_levels.iter().filter(|l| **l >= close) {
            resistance = resistance.min(*lvl);
        }
        let mut support = swing_low.min(close);
        for lvl in ctx.historical_levels.iter().filter(|l| **l <= close) {
            support = support.max(*lvl);
        }

        fv.set(idx::NEAREST_RESISTANCE, resistance);
        fv.set(idx::NEAREST_SUPPORT, support);
        fv.set(idx::RESISTANCE_TOUCHES, resistance_touches);
        fv.set(idx::SUPPORT_TOUCHES, support_touches);
        fv.set(idx::DIST_RESISTANCE_PTS, resistance - close);
        fv.set(idx::DIST_SUPPORT_PTS, close - support);
        fv.set(idx::DIST_RESISTANCE_ATR, (resistance - close) / atr);
        fv.set(idx::DIST_SUPPORT_ATR, (close - support) / atr);
    }

    fn micro_features(&mut self, fv: &mut FeatureVector, candles: &[Candle], _ctx: &DayContext) {
        let n = candles.len();
        let last = candles[n - 1];
        let tail = &candles[n - SR_WINDOW..];

        let mut values = [f64::NAN; 10];

        let ups = tail
            .windows(2)
            .filter(|w| w[1].close > w[0].close)
            .count() as f64;
        let downs = tail
            .windows(2)
            .filter(|w| w[1].close < w[0].close)
            .count() as f64;
        if ups + downs > 0.0 {
            values[0] = ups / (ups + downs);
        }

        let range = last.range();
        if range > 0.0 {
            let mid = (last.high + last.low) / 2.0;
            values[1] = ((last.close - mid) / (range / 2.0)).clamp(-1.0, 1.0);
            values[2] = (last.high - last.open.max(last.close)) / range;
            values[3] = (last.open.min(last.close) - last.low) / range;
            values[4] = (last.close - last.open).abs() / range;
        }

        // Gap: session open against the previous session's final close.
        let session_start = session_open(last.time);
        let today: Vec<&Candle> = candles.iter().filter(|c| c.time >= session_start).collect();
        if let Some(first) = today.first() {
            if let Some(prev) = candles.iter().rev().find(|c| c.time < session_start) {
                if prev.close != 0.0 {
                    values[5] = (first.open - prev.close) / prev.close * 100.0;
                }
            }
            // Opening-range position over the first 15 minutes.
            let or_bars: Vec<&&Candle> = today.iter().take(3).collect();
            let or_high = or_bars.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let or_low = or_bars.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            if or_high > or_low {
                values[6] = ((last.close - or_low) / (or_high - or_low)).clamp(-1.0, 2.0);
            }
        }

        let volumes: Vec<f64> = candles.iter().map(|c| c.volume as f64).collect();
        values[7] = ind::zscore_last(&volumes, 20).unwrap_or(f64::NAN);

        let total_vol: f64 = tail.iter().map(|c| c.volume as f64).sum();
        if total_vol > 0.0 {
            let signed: f64 = tail
                .windows(2)
                .map(|w| (w[1].close - w[0].close).signum() * w[1].volume as f64)
                .sum();
            values[8] = signed / total_vol;
        }

        let spread_tail = &candles[n - 5..];
        let spreads: Vec<f64> = spread_tail
            .iter()
            .filter(|c| c.close > 0.0)
            .map(|c| c.range() / c.close * 10_000.0)
            .collect();
        if !spreads.is_empty() {
            values[9] = spreads.iter().sum::<f64>() / spreads.len() as f64;
        }

        // Forward-fill undefined slots from the previous evaluation.
        if let Some(prev) = self.last_micro {
            for (v, p) in values.iter_mut().zip(prev.iter()) {
                if !v.is_finite() {
                    *v = *p;
                }
            }
        }

        let slots = [
            idx::TICK_DIRECTION_RATIO,
            idx::ORDER_FLOW_IMBALANCE,
            idx::UPPER_WICK_RATIO,
            idx::LOWER_WICK_RATIO,
            idx::BODY_RATIO,
            idx::GAP_PCT,
            idx::OPENING_RANGE_POS,
            idx::VOLUME_ZSCORE,
            idx::CUM_SIGNED_VOLUME,
            idx::SPREAD_PROXY,
        ];
        for (slot, v) in slots.iter().zip(values.iter()) {
            fv.set(*slot, *v);
        }
        self.last_micro = Some(std::array::from_fn(|i| fv.get(slots[i])));
    }

    fn options_features(&self, fv: &mut FeatureVector, now_utc: i64) {
        let chain = match &self.cached_chain {
            Some(c) => c,
            None => {
                fv.feature_stale = true;
                return;
            }
        };
        if chain.age_secs(now_utc) > CHAIN_STALE_SECS {
            fv.feature_stale = true;
            return;
        }

        fv.set(idx::PCR, chain.pcr());
        fv.set(idx::OI_SKEW, chain.oi_skew());
        fv.set(idx::IV_SKEW, chain.iv_skew());

        let ivs: Vec<f64> = chain
            .rows
            .iter()
            .flat_map(|r| [r.call_iv, r.put_iv])
            .filter(|v| *v > 0.0)
            .collect();
        fv.set(
            idx::ATM_IV_RANK,
            ind::percentile_rank(&ivs, chain.atm_iv()).unwrap_or(0.0),
        );

        // Institutional-activity proxy: OI concentration near the money.
        if let Some(atm) = chain.row_nearest(chain.spot) {
            let total_oi: f64 = chain.rows.iter().map(|r| r.call_oi + r.put_oi).sum();
            if total_oi > 0.0 {
                fv.set(
                    idx::INST_ACTIVITY,
                    (atm.call_oi + atm.put_oi) / total_oi * 100.0,
                );
            }
        }
    }

    fn time_features(&self, fv: &mut FeatureVector, bar_time: i64) {
        // Candle times are IST-aligned epoch seconds, so wall-clock fields
        // come straight out of day arithmetic.
        let secs_of_day = bar_time.rem_euclid(86_400);
        let hour = secs_of_day / 3_600;
        let minute = (secs_of_day % 3_600) / 60;
        fv.set(idx::HOUR, hour as f64);
        fv.set(idx::MINUTE, minute as f64);
        fv.set(idx::MINUTE_OF_DAY, (secs_of_day / 60) as f64);
        let phase = if hour < 11 {
            0.0
        } else if hour < 14 {
            1.0
        } else {
            2.0
        };
        fv.set(idx::MARKET_PHASE, phase);
    }

    fn aggregate_features(
        &self,
        fv: &mut FeatureVector,
        candles: &[Candle],
        ctx: &DayContext,
        close: f64,
        atr: f64,
    ) {
        let n = candles.len();

        // Breakouts against the prior swing window (current bar excluded).
        let prior = &candles[n - SR_WINDOW - 1..n - 1];
        let prior_high = prior.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let prior_low = prior.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let breakout_up = if close > prior_high { 1.0 } else { 0.0 };
        let breakout_down = if close < prior_low { 1.0 } else { 0.0 };
        fv.set(idx::BREAKOUT_UP, breakout_up);
        fv.set(idx::BREAKOUT_DOWN, breakout_down);
        fv.set(idx::STRUCTURE_BREAK, breakout_up.max(breakout_down));

        // Compression: recent 10-bar envelope tight relative to ATR.
        let recent = &candles[n - 10..];
        let env = recent.iter().map(|c| c.high).fold(f64::MIN, f64::max)
            - recent.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        fv.set(
            idx::RANGE_COMPRESSION,
            if env < 2.0 * atr { 1.0 } else { 0.0 },
        );

        // Choppiness: direction flips across the last 10 closes.
        let closes_tail: Vec<f64> = candles[n - 11..].iter().map(|c| c.close).collect();
        let dirs: Vec<f64> = closes_tail.windows(2).map(|w| (w[1] - w[0]).signum()).collect();
        let flips = dirs
            .windows(2)
            .filter(|w| w[0] != 0.0 && w[1] != 0.0 && w[0] != w[1])
            .count() as f64;
        let choppiness = (flips / 9.0).clamp(0.0, 1.0);
        fv.set(idx::CHOPPINESS, choppiness);

        // 15-minute trend from resampled closes (every third 5-minute bar).
        let trend_15m = self.trend_15m(candles);
        fv.set(idx::TREND_15M, trend_15m);

        let alignment = fv.get(idx::EMA_ALIGNMENT);
        let confluence = if trend_15m != 0.0 && trend_15m == alignment {
            1.0
        } else if trend_15m == 0.0 || alignment == 0.0 {
            0.5
        } else {
            0.0
        };
        fv.set(idx::MTF_CONFLUENCE, confluence);

        // Session bias: where price sits relative to the day open, in ATRs.
        let session_start = session_open(candles[n - 1].time);
        if let Some(first) = candles.iter().find(|c| c.time >= session_start) {
            fv.set(
                idx::SESSION_BIAS,
                ((close - first.open) / (2.0 * atr)).clamp(-1.0, 1.0),
            );
        }

        fv.set(idx::FAILURE_WINDOW, if ctx.failure_window { 1.0 } else { 0.0 });
        fv.set(idx::SL_HITS_TODAY, ctx.sl_hits_today as f64);

        // Layer scores.
        let support = fv.get(idx::NEAREST_SUPPORT);
        let resistance = fv.get(idx::NEAREST_RESISTANCE);
        let range_pos = if resistance > support {
            ((close - support) / (resistance - support)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let positioning = (range_pos - 0.5).abs() * 2.0;
        let cpr_tc = fv.get(idx::CPR_TC);
        let cpr_bc = cpr_tc - fv.get(idx::CPR_WIDTH);
        let cpr_align = if cpr_tc > 0.0 && (close > cpr_tc || close < cpr_bc) {
            1.0
        } else {
            0.4
        };
        let l1 = (0.30 * positioning
            + 0.25 * fv.get(idx::STRUCTURE_BREAK)
            + 0.25 * cpr_align
            + 0.20 * (1.0 - choppiness))
            .clamp(0.0, 1.0);

        let pcr_balance = 1.0 - (fv.get(idx::PCR) - 1.0).abs().min(1.0);
        let oi_conviction = fv.get(idx::OI_SKEW).abs().min(1.0);
        let iv_calm = 1.0 - fv.get(idx::IV_SKEW).abs().min(1.0);
        let inst = (fv.get(idx::INST_ACTIVITY) / 100.0).clamp(0.0, 1.0);
        let l2 = (0.30 * pcr_balance + 0.30 * oi_conviction + 0.20 * iv_calm + 0.20 * inst)
            .clamp(0.0, 1.0);

        let rsi = fv.get(idx::RSI_14);
        let rsi_band = (1.0 - ((rsi - 55.0).abs() / 45.0)).clamp(0.0, 1.0);
        let hist = fv.get(idx::MACD_HIST);
        let macd_agree = if alignment != 0.0 && hist.signum() == alignment {
            1.0
        } else if alignment == 0.0 {
            0.5
        } else {
            0.0
        };
        let l3 = (0.40 * alignment.abs() + 0.30 * rsi_band + 0.30 * macd_agree).clamp(0.0, 1.0);

        // Headroom toward the trade-biased side, in ATRs.
        let bias = if alignment != 0.0 {
            alignment
        } else {
            fv.get(idx::TREND_REGIME)
        };
        let headroom = if bias >= 0.0 {
            fv.get(idx::DIST_RESISTANCE_ATR)
        } else {
            fv.get(idx::DIST_SUPPORT_ATR)
        };
        let l4 = (headroom / 3.0).clamp(0.0, 1.0);

        let l5 = (0.60 * confluence + 0.40 * if trend_15m != 0.0 { 1.0 } else { 0.0 })
            .clamp(0.0, 1.0);

        fv.set(idx::L1_STRUCTURE, l1);
        fv.set(idx::L2_OPTIONS, l2);
        fv.set(idx::L3_TECHNICAL, l3);
        fv.set(idx::L4_BLOCKING, l4);
        fv.set(idx::L5_MTF, l5);
        fv.set(
            idx::COMPOSITE_SCORE,
            0.25 * l1 + 0.20 * l2 + 0.20 * l3 + 0.20 * l4 + 0.15 * l5,
        );
    }

    /// EMA(5) vs EMA(20) of 15-minute resampled closes, with a deadband so a
    /// flat tape reads neutral.
    fn trend_15m(&self, candles: &[Candle]) -> f64 {
        let closes: Vec<f64> = candles
            .iter()
            .rev()
            .step_by(3)
            .take(60)
            .map(|c| c.close)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let (fast, slow) = match (ind::ema(&closes, 5), ind::ema(&closes, 20)) {
            (Some(f), Some(s)) => (f, s),
            _ => return 0.0,
        };
        let deadband = slow.abs() * 0.0005;
        if fast > slow + deadband {
            1.0
        } else if fast < slow - deadband {
            -1.0
        } else {
            0.0
        }
    }
}

/// IST session open (09:15) of the day containing `bar_time`.
/// Bar times are IST-aligned epoch seconds, so this is pure day arithmetic.
fn session_open(bar_time: i64) -> i64 {
    bar_time - bar_time.rem_euclid(86_400) + SESSION_OPEN_MIN * 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_models::{ChainRow, BAR_SECS};

    /// A day of synthetic bars starting 09:15 IST with a gentle uptrend.
    fn window(n: usize) -> Vec<Candle> {
        let day_start = 20_000 * 86_400 + SESSION_OPEN_MIN * 60;
        (0..n)
            .map(|i| {
                let base = 24_000.0 + i as f64 * 0.8 + ((i % 7) as f64 - 3.0);
                Candle {
                    time: day_start + i as i64 * BAR_SECS,
                    open: base,
                    high: base + 6.0,
                    low: base - 6.0,
                    close: base + 2.0,
                    volume: 10_000 + (i % 5) as i64 * 500,
                }
            })
            .collect()
    }

    fn ctx() -> DayContext {
        DayContext {
            prev_day_high: 24_080.0,
            prev_day_low: 23_900.0,
            prev_day_close: 24_000.0,
            historical_levels: vec![23_850.0, 24_300.0],
            sl_hits_today: 0,
            failure_window: false,
        }
    }

    #[test]
    fn exactly_200_candles_succeeds() {
        let mut fe = FeatureEngineer::new();
        let fv = fe.compute(&window(MIN_WINDOW), &ctx(), 0).unwrap();
        assert!(fv.is_finite());
    }

    #[test]
    fn short_window_fails_with_counts() {
        let mut fe = FeatureEngineer::new();
        let err = fe.compute(&window(199), &ctx(), 0).unwrap_err();
        match err {
            EngineError::InsufficientData { have, need } => {
                assert_eq!(have, 199);
                assert_eq!(need, 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn compute_is_pure_for_same_inputs() {
        let w = window(220);
        let c = ctx();
        let mut fe = FeatureEngineer::new();
        let a = fe.compute(&w, &c, 0).unwrap();
        let b = fe.compute(&w, &c, 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_chain_marks_stale() {
        let mut fe = FeatureEngineer::new();
        let fv = fe.compute(&window(210), &ctx(), 0).unwrap();
        assert!(fv.feature_stale);
        assert_eq!(fv.get(idx::PCR), 0.0);
    }

    #[test]
    fn fresh_chain_populates_option_slots() {
        let mut fe = FeatureEngineer::new();
        fe.set_chain(ChainSnapshot {
            underlying: "NIFTY".into(),
            expiry: "2026-08-06".into(),
            fetched_at: 1_000,
            spot: 24_150.0,
            rows: vec![
                ChainRow {
                    strike: 24_100.0,
                    call_oi: 500.0,
                    put_oi: 900.0,
                    call_iv: 11.5,
                    put_iv: 12.5,
                    ..Default::default()
                },
                ChainRow {
                    strike: 24_150.0,
                    call_oi: 800.0,
                    put_oi: 700.0,
                    call_iv: 12.0,
                    put_iv: 12.2,
                    ..Default::default()
                },
            ],
        });
        let fv = fe.compute(&window(210), &ctx(), 1_100).unwrap();
        assert!(!fv.feature_stale);
        assert!(fv.get(idx::PCR) > 1.0);
    }

    #[test]
    fn stale_chain_falls_back_to_sentinels() {
        let mut fe = FeatureEngineer::new();
        fe.set_chain(ChainSnapshot {
            fetched_at: 1_000,
            ..ChainSnapshot::default()
        });
        let fv = fe
            .compute(&window(210), &ctx(), 1_000 + CHAIN_STALE_SECS + 1)
            .unwrap();
        assert!(fv.feature_stale);
        assert_eq!(fv.get(idx::PCR), 0.0);
    }

    #[test]
    fn uptrend_sets_trend_slots() {
        let mut fe = FeatureEngineer::new();
        let fv = fe.compute(&window(260), &ctx(), 0).unwrap();
        assert_eq!(fv.get(idx::TREND_REGIME), 1.0);
        assert_eq!(fv.get(idx::EMA_ALIGNMENT), 1.0);
        assert_eq!(fv.get(idx::TREND_15M), 1.0);
        assert!(fv.get(idx::RSI_14) > 50.0);
    }

    #[test]
    fn time_slots_match_bar_clock() {
        let mut fe = FeatureEngineer::new();
        let w = window(200);
        let fv = fe.compute(&w, &ctx(), 0).unwrap();
        let minute_of_day = fv.get(idx::HOUR) * 60.0 + fv.get(idx::MINUTE);
        assert_eq!(minute_of_day, fv.get(idx::MINUTE_OF_DAY));
    }

    #[test]
    fn layer_scores_are_unit_interval() {
        let mut fe = FeatureEngineer::new();
        let fv = fe.compute(&window(230), &ctx(), 0).unwrap();
        for slot in [
            idx::L1_STRUCTURE,
            idx::L2_OPTIONS,
            idx::L3_TECHNICAL,
            idx::L4_BLOCKING,
            idx::L5_MTF,
            idx::COMPOSITE_SCORE,
        ] {
            let v = fv.get(slot);
            assert!((0.0..=1.0).contains(&v), "slot {slot} = {v}");
        }
    }
}
