//! Windowed indicator calculations.
//!
//! All functions take the full available window (oldest first) and return
//! `None` when the window is shorter than the indicator's minimum. Callers
//! map `None` onto the schema sentinel. No look-ahead: every value is
//! computed from the bars at or before the evaluation bar.

use drishti_models::Candle;

/// Exponential moving average of closes, seeded with the SMA of the first
/// `period` values.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period || period == 0 {
        return None;
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values.iter().take(period).sum::<f64>() / period as f64;
    Some(
        values
            .iter()
            .skip(period)
            .fold(seed, |prev, v| (v - prev) * k + prev),
    )
}

/// Wilder RSI.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period + 1 || period == 0 {
        return None;
    }
    let changes: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let (mut avg_gain, mut avg_loss) = changes
        .iter()
        .take(period)
        .fold((0.0_f64, 0.0_f64), |(g, l), &c| {
            if c > 0.0 {
                (g + c, l)
            } else {
                (g, l - c)
            }
        });
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for &c in changes.iter().skip(period) {
        let (gain, loss) = if c > 0.0 { (c, 0.0) } else { (0.0, -c) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        Some(100.0)
    } else {
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// MACD line, signal line, and histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD(fast, slow, signal) computed over prefix windows so the signal line
/// sees a proper MACD series.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> Option<MacdOutput> {
    if values.len() < slow + signal {
        return None;
    }
    let mut series = Vec::with_capacity(values.len() - slow + 1);
    for end in slow..=values.len() {
        let slice = &values[..end];
        series.push(ema(slice, fast)? - ema(slice, slow)?);
    }
    let signal_line = ema(&series, signal)?;
    let line = *series.last()?;
    Some(MacdOutput {
        line,
        signal: signal_line,
        histogram: line - signal_line,
    })
}

fn true_range(c: &Candle, prev_close: f64) -> f64 {
    let hl = c.high - c.low;
    let hc = (c.high - prev_close).abs();
    let lc = (c.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Wilder ATR.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < period + 1 || period == 0 {
        return None;
    }
    let trs: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();
    let seed: f64 = trs.iter().take(period).sum::<f64>() / period as f64;
    Some(trs.iter().skip(period).fold(seed, |prev, &tr| {
        (prev * (period as f64 - 1.0) + tr) / period as f64
    }))
}

/// Rolling ATR series aligned to the tail of the window (one value per bar
/// from bar `period` onward). Used for vol-of-vol.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if candles.len() < period + 1 || period == 0 {
        return Vec::new();
    }
    let trs: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    let mut value: f64 = trs.iter().take(period).sum::<f64>() / period as f64;
    out.push(value);
    for &tr in trs.iter().skip(period) {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
        out.push(value);
    }
    out
}

/// Wilder ADX over the window.
pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < 2 * period + 1 || period == 0 {
        return None;
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    let mut trs = Vec::with_capacity(candles.len() - 1);
    for w in candles.windows(2) {
        let up = w[1].high - w[0].high;
        let down = w[0].low - w[1].low;
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        trs.push(true_range(&w[1], w[0].close));
    }

    let smooth = |xs: &[f64]| -> Vec<f64> {
        let mut out = Vec::with_capacity(xs.len() - period + 1);
        let mut value: f64 = xs.iter().take(period).sum();
        out.push(value);
        for &x in xs.iter().skip(period) {
            value = value - value / period as f64 + x;
            out.push(value);
        }
        out
    };

    let tr_s = smooth(&trs);
    let plus_s = smooth(&plus_dm);
    let minus_s = smooth(&minus_dm);

    let mut dx = Vec::with_capacity(tr_s.len());
    for i in 0..tr_s.len() {
        if tr_s[i] <= 0.0 {
            dx.push(0.0);
            continue;
        }
        let pdi = 100.0 * plus_s[i] / tr_s[i];
        let mdi = 100.0 * minus_s[i] / tr_s[i];
        let sum = pdi + mdi;
        dx.push(if sum > 0.0 {
            100.0 * (pdi - mdi).abs() / sum
        } else {
            0.0
        });
    }

    if dx.len() < period {
        return None;
    }
    let seed: f64 = dx.iter().take(period).sum::<f64>() / period as f64;
    Some(dx.iter().skip(period).fold(seed, |prev, &d| {
        (prev * (period as f64 - 1.0) + d) / period as f64
    }))
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Std of simple returns over the trailing `n` bars.
pub fn returns_std(values: &[f64], n: usize) -> Option<f64> {
    if values.len() < n + 1 {
        return None;
    }
    let tail = &values[values.len() - n - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();
    std_dev(&returns)
}

/// Parkinson volatility over the trailing `n` bars:
/// sqrt( (1 / (4·ln2)) · Σ ln(H/L)² / N ).
pub fn parkinson(candles: &[Candle], n: usize) -> Option<f64> {
    if candles.len() < n || n == 0 {
        return None;
    }
    let tail = &candles[candles.len() - n..];
    let sum: f64 = tail
        .iter()
        .filter(|c| c.low > 0.0 && c.high >= c.low)
        .map(|c| (c.high / c.low).ln().powi(2))
        .sum();
    Some((sum / (4.0 * std::f64::consts::LN_2 * n as f64)).sqrt())
}

/// Garman-Klass volatility over the trailing `n` bars.
pub fn garman_klass(candles: &[Candle], n: usize) -> Option<f64> {
    if candles.len() < n || n == 0 {
        return None;
    }
    let tail = &candles[candles.len() - n..];
    let mut sum = 0.0;
    for c in tail {
        if c.low <= 0.0 || c.open <= 0.0 {
            continue;
        }
        let hl = (c.high / c.low).ln();
        let co = (c.close / c.open).ln();
        sum += 0.5 * hl * hl - (2.0 * std::f64::consts::LN_2 - 1.0) * co * co;
    }
    let mean = sum / n as f64;
    Some(mean.max(0.0).sqrt())
}

/// Percentile rank of `x` among `values` in [0, 100].
pub fn percentile_rank(values: &[f64], x: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let below = values.iter().filter(|v| **v <= x).count();
    Some(100.0 * below as f64 / values.len() as f64)
}

/// Session VWAP over bars at or after `session_start`.
pub fn session_vwap(candles: &[Candle], session_start: i64) -> Option<f64> {
    let mut pv = 0.0;
    let mut vol = 0.0;
    for c in candles.iter().filter(|c| c.time >= session_start) {
        let typical = (c.high + c.low + c.close) / 3.0;
        pv += typical * c.volume as f64;
        vol += c.volume as f64;
    }
    if vol > 0.0 {
        Some(pv / vol)
    } else {
        // Zero-volume session (index feeds): fall back to the mean close.
        let closes: Vec<f64> = candles
            .iter()
            .filter(|c| c.time >= session_start)
            .map(|c| c.close)
            .collect();
        if closes.is_empty() {
            None
        } else {
            Some(closes.iter().sum::<f64>() / closes.len() as f64)
        }
    }
}

/// Z-score of the last value against the trailing `n` values before it.
pub fn zscore_last(values: &[f64], n: usize) -> Option<f64> {
    if values.len() < n + 1 {
        return None;
    }
    let last = *values.last()?;
    let base = &values[values.len() - n - 1..values.len() - 1];
    let mean = base.iter().sum::<f64>() / base.len() as f64;
    let sd = std_dev(base)?;
    if sd > 0.0 {
        Some((last - mean) / sd)
    } else {
        Some(0.0)
    }
}
