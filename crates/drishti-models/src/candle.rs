//! 5-minute candles and the bounded live-candle buffer.
//!
//! The buffer holds the most recent N bars; the last element is the live
//! candle still being aggregated from ticks, everything before it is sealed.
//! Tick aggregation is monotonic in bar start: late ticks are counted and
//! dropped, never applied.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Seconds per bar. Candle `time` is always a multiple of this.
pub const BAR_SECS: i64 = 300;

/// A single OHLCV bar. `time` is IST-aligned epoch seconds at bar start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    /// Open a fresh bar from the first trade of the window.
    pub fn from_tick(bar_start: i64, ltp: f64, qty: i64) -> Self {
        Self {
            time: bar_start,
            open: ltp,
            high: ltp,
            low: ltp,
            close: ltp,
            volume: qty,
        }
    }

    /// Fold a trade into this bar.
    pub fn apply_tick(&mut self, ltp: f64, qty: i64) {
        self.high = self.high.max(ltp);
        self.low = self.low.min(ltp);
        self.close = ltp;
        self.volume += qty;
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_well_formed(&self) -> bool {
        self.time % BAR_SECS == 0
            && self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
    }
}

/// A trade print from the market feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub security_id: u32,
    pub ltp: f64,
    /// Epoch seconds (exchange time, IST wall clock).
    pub ts: i64,
    pub qty: i64,
}

impl Tick {
    /// Start of the 5-minute window this tick belongs to.
    pub fn bar_start(&self) -> i64 {
        (self.ts / BAR_SECS) * BAR_SECS
    }
}

/// Bounded ordered window of recent candles with a live tail.
///
/// Single writer (the tick ingestor), concurrent readers that copy the
/// window out under a short lock held by the caller.
#[derive(Debug, Clone)]
pub struct CandleBuffer {
    bars: VecDeque<Candle>,
    capacity: usize,
    /// Ticks older than the live bar, dropped on arrival.
    pub late_ticks: u64,
}

impl CandleBuffer {
    /// `capacity` must cover at least 5 trading days of 5-minute bars (376).
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
            late_ticks: 0,
        }
    }

    /// Seed the buffer with already-sealed historical bars, oldest first.
    /// Bars that are not multiples of the bar width are skipped.
    pub fn seed(&mut self, history: impl IntoIterator<Item = Candle>) {
        for c in history {
            if c.time % BAR_SECS != 0 {
                continue;
            }
            self.push_sealed(c);
        }
    }

    fn push_sealed(&mut self, c: Candle) {
        if let Some(last) = self.bars.back() {
            if c.time <= last.time {
                return;
            }
        }
        if self.bars.len() == self.capacity {
            self.bars.pop_front();
        }
        self.bars.push_back(c);
    }

    /// Apply a live tick. Seals the live candle and opens a new one when the
    /// tick crosses a bar boundary; drops ticks that predate the live bar.
    pub fn on_tick(&mut self, tick: &Tick) {
        let bar_start = tick.bar_start();
        match self.bars.back_mut() {
            Some(live) if bar_start == live.time => live.apply_tick(tick.ltp, tick.qty),
            Some(live) if bar_start > live.time => {
                // The previous bar is now final; open the next window.
                self.push_sealed(Candle::from_tick(bar_start, tick.ltp, tick.qty));
            }
            Some(_) => self.late_ticks += 1,
            None => self.push_sealed(Candle::from_tick(bar_start, tick.ltp, tick.qty)),
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.bars.back()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.bars.back().map(|c| c.close)
    }

    /// Copy of the most recent `n` bars (live bar included), oldest first.
    pub fn window(&self, n: usize) -> Vec<Candle> {
        let skip = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(skip).copied().collect()
    }

    /// Copy of the full buffer, oldest first.
    pub fn all(&self) -> Vec<Candle> {
        self.bars.iter().copied().collect()
    }
}
