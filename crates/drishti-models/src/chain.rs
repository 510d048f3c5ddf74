//! Option-chain snapshot consumed by the feature engineer and the
//! trading-level generator.

use serde::{Deserialize, Serialize};

/// One strike row. Prices are option premiums in rupees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainRow {
    pub strike: f64,
    pub call_oi: f64,
    pub put_oi: f64,
    pub call_iv: f64,
    pub put_iv: f64,
    pub call_bid: f64,
    pub call_ask: f64,
    pub put_bid: f64,
    pub put_ask: f64,
}

impl ChainRow {
    pub fn call_mid(&self) -> Option<f64> {
        if self.call_bid > 0.0 && self.call_ask >= self.call_bid {
            Some((self.call_bid + self.call_ask) / 2.0)
        } else {
            None
        }
    }

    pub fn put_mid(&self) -> Option<f64> {
        if self.put_bid > 0.0 && self.put_ask >= self.put_bid {
            Some((self.put_bid + self.put_ask) / 2.0)
        } else {
            None
        }
    }
}

/// Full chain for one underlying and expiry, with its fetch time for
/// staleness checks.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub underlying: String,
    /// ISO date string, e.g. "2026-08-06".
    pub expiry: String,
    /// Epoch seconds (UTC) when the chain was fetched.
    pub fetched_at: i64,
    pub spot: f64,
    pub rows: Vec<ChainRow>,
}

impl ChainSnapshot {
    /// Age relative to an evaluation instant.
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.fetched_at).max(0)
    }

    /// Put-call ratio over total open interest.
    pub fn pcr(&self) -> f64 {
        let call_oi: f64 = self.rows.iter().map(|r| r.call_oi).sum();
        let put_oi: f64 = self.rows.iter().map(|r| r.put_oi).sum();
        if call_oi > 0.0 {
            put_oi / call_oi
        } else {
            0.0
        }
    }

    /// Normalized call-minus-put OI imbalance in [−1, 1].
    pub fn oi_skew(&self) -> f64 {
        let call_oi: f64 = self.rows.iter().map(|r| r.call_oi).sum();
        let put_oi: f64 = self.rows.iter().map(|r| r.put_oi).sum();
        let total = call_oi + put_oi;
        if total > 0.0 {
            (call_oi - put_oi) / total
        } else {
            0.0
        }
    }

    /// Mean call-IV minus put-IV across quoted strikes.
    pub fn iv_skew(&self) -> f64 {
        let quoted: Vec<&ChainRow> = self
            .rows
            .iter()
            .filter(|r| r.call_iv > 0.0 && r.put_iv > 0.0)
            .collect();
        if quoted.is_empty() {
            return 0.0;
        }
        quoted.iter().map(|r| r.call_iv - r.put_iv).sum::<f64>() / quoted.len() as f64
    }

    /// ATM implied volatility (mean of call/put IV at the nearest strike).
    pub fn atm_iv(&self) -> f64 {
        self.row_nearest(self.spot)
            .map(|r| {
                if r.call_iv > 0.0 && r.put_iv > 0.0 {
                    (r.call_iv + r.put_iv) / 2.0
                } else {
                    r.call_iv.max(r.put_iv)
                }
            })
            .unwrap_or(0.0)
    }

    /// Row whose strike is closest to `price`.
    pub fn row_nearest(&self, price: f64) -> Option<&ChainRow> {
        self.rows.iter().min_by(|a, b| {
            (a.strike - price)
                .abs()
                .partial_cmp(&(b.strike - price).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Row at an exact listed strike.
    pub fn row_at(&self, strike: f64) -> Option<&ChainRow> {
        self.rows.iter().find(|r| (r.strike - strike).abs() < 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ChainSnapshot {
        ChainSnapshot {
            underlying: "NIFTY".into(),
            expiry: "2026-08-06".into(),
            fetched_at: 1_000,
            spot: 24_010.0,
            rows: vec![
                ChainRow {
                    strike: 23_950.0,
                    call_oi: 100.0,
                    put_oi: 300.0,
                    call_iv: 11.0,
                    put_iv: 12.0,
                    ..Default::default()
                },
                ChainRow {
                    strike: 24_000.0,
                    call_oi: 200.0,
                    put_oi: 200.0,
                    call_iv: 12.0,
                    put_iv: 12.5,
                    call_bid: 90.0,
                    call_ask: 92.0,
                    put_bid: 80.0,
                    put_ask: 84.0,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn pcr_and_skews() {
        let s = snapshot();
        assert!((s.pcr() - 500.0 / 300.0).abs() < 1e-9);
        assert!(s.oi_skew() < 0.0);
        assert!(s.iv_skew() < 0.0);
    }

    #[test]
    fn nearest_row_picks_atm() {
        let s = snapshot();
        assert_eq!(s.row_nearest(24_010.0).unwrap().strike, 24_000.0);
        assert_eq!(s.row_at(23_950.0).unwrap().put_oi, 300.0);
    }

    #[test]
    fn mids_require_two_sided_quotes() {
        let s = snapshot();
        let atm = s.row_at(24_000.0).unwrap();
        assert_eq!(atm.call_mid(), Some(91.0));
        let wing = s.row_at(23_950.0).unwrap();
        assert_eq!(wing.call_mid(), None);
    }
}
