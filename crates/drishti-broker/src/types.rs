//! Wire shapes for the broker REST API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use drishti_models::{Candle, ChainRow, ChainSnapshot, BAR_SECS};

/// Request body for the historical intraday endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntradayRequest {
    pub security_id: String,
    pub exchange_segment: String,
    pub instrument: String,
    /// Bar interval in minutes.
    pub interval: u32,
    pub from_date: String,
    pub to_date: String,
}

/// Column-oriented candle arrays, as the feed returns them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntradayResponse {
    #[serde(default)]
    pub open: Vec<f64>,
    #[serde(default)]
    pub high: Vec<f64>,
    #[serde(default)]
    pub low: Vec<f64>,
    #[serde(default)]
    pub close: Vec<f64>,
    #[serde(default)]
    pub volume: Vec<f64>,
    /// Epoch seconds, IST-aligned.
    #[serde(default)]
    pub timestamp: Vec<i64>,
}

impl IntradayResponse {
    /// Rows with any missing column are dropped; times are floored to the
    /// bar width so the buffer invariant holds.
    pub fn into_candles(self) -> Vec<Candle> {
        let n = [
            self.open.len(),
            self.high.len(),
            self.low.len(),
            self.close.len(),
            self.timestamp.len(),
        ]
        .into_iter()
        .min()
        .unwrap_or(0);

        (0..n)
            .map(|i| Candle {
                time: self.timestamp[i] - self.timestamp[i].rem_euclid(BAR_SECS),
                open: self.open[i],
                high: self.high[i],
                low: self.low[i],
                close: self.close[i],
                volume: self.volume.get(i).copied().unwrap_or(0.0) as i64,
            })
            .filter(Candle::is_well_formed)
            .collect()
    }
}

/// Request body for the option-chain endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChainRequest {
    #[serde(rename = "UnderlyingScrip")]
    pub underlying_scrip: u32,
    #[serde(rename = "UnderlyingSeg")]
    pub underlying_seg: String,
    #[serde(rename = "Expiry")]
    pub expiry: String,
}

/// One side (CE or PE) of a chain row on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainLegWire {
    #[serde(default)]
    pub implied_volatility: f64,
    #[serde(default)]
    pub oi: f64,
    #[serde(default)]
    pub top_bid_price: f64,
    #[serde(default)]
    pub top_ask_price: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainRowWire {
    #[serde(default)]
    pub ce: Option<ChainLegWire>,
    #[serde(default)]
    pub pe: Option<ChainLegWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainDataWire {
    #[serde(default)]
    pub last_price: f64,
    /// Keyed by strike rendered as a decimal string.
    #[serde(default)]
    pub oc: BTreeMap<String, ChainRowWire>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainResponse {
    #[serde(default)]
    pub data: ChainDataWire,
}

impl ChainResponse {
    pub fn into_snapshot(self, underlying: &str, expiry: &str, fetched_at: i64) -> ChainSnapshot {
        let rows = self
            .data
            .oc
            .into_iter()
            .filter_map(|(strike, row)| {
                let strike: f64 = strike.parse().ok()?;
                let ce = row.ce.unwrap_or_default();
                let pe = row.pe.unwrap_or_default();
                Some(ChainRow {
                    strike,
                    call_oi: ce.oi,
                    put_oi: pe.oi,
                    call_iv: ce.implied_volatility,
                    put_iv: pe.implied_volatility,
                    call_bid: ce.top_bid_price,
                    call_ask: ce.top_ask_price,
                    put_bid: pe.top_bid_price,
                    put_ask: pe.top_ask_price,
                })
            })
            .collect();

        ChainSnapshot {
            underlying: underlying.to_string(),
            expiry: expiry.to_string(),
            fetched_at,
            spot: self.data.last_price,
            rows,
        }
    }
}

/// Token refresh request and response.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest {
    pub client_id: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Epoch seconds UTC.
    pub expires_at: i64,
}
