//! Fixed 74-slot feature schema.
//!
//! The slot order is the ABI between the feature engineer, the trained model
//! artifact, and the metrics repository. Adding, removing, or reordering a
//! slot is a breaking change that requires retraining the model.
//!
//! Values are always finite: producers substitute the documented sentinel
//! (0.0) for undefined indicator values and forward-fill microstructure
//! slots, so consumers never see NaN or infinity.

use serde_json::{Map, Value};

/// Number of feature slots. Must equal `FEATURE_NAMES.len()`.
pub const FEATURE_COUNT: usize = 74;

/// Canonical slot names, in slot order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // trend / momentum
    "ema_5",
    "ema_12",
    "ema_20",
    "ema_50",
    "ema_200",
    "rsi_14",
    "rsi_5",
    "macd",
    "macd_signal",
    "macd_hist",
    "adx",
    "ema_alignment",
    "trend_regime",
    "momentum_10",
    // volatility
    "atr_14",
    "parkinson_20",
    "garman_klass_20",
    "returns_std_5",
    "returns_std_20",
    "vol_of_vol",
    "vol_of_vol_z",
    "range_pctile_78",
    // CPR
    "cpr_pivot",
    "cpr_tc",
    "cpr_width",
    "cpr_dist_pivot_atr",
    "cpr_dist_tc_atr",
    "cpr_dist_bc_atr",
    // VWAP
    "vwap",
    "vwap_dist_atr",
    "vwap_slope",
    // support / resistance
    "nearest_resistance",
    "nearest_support",
    "resistance_touches",
    "support_touches",
    "dist_resistance_pts",
    "dist_support_pts",
    "dist_resistance_atr",
    "dist_support_atr",
    // microstructure
    "tick_direction_ratio",
    "order_flow_imbalance",
    "upper_wick_ratio",
    "lower_wick_ratio",
    "body_ratio",
    "gap_pct",
    "opening_range_pos",
    "volume_zscore",
    "cum_signed_volume",
    "spread_proxy",
    // options-derived
    "pcr",
    "oi_skew",
    "iv_skew",
    "atm_iv_rank",
    "inst_activity",
    // time
    "hour",
    "minute",
    "minute_of_day",
    "market_phase",
    // aggregate scores and flags
    "l1_structure",
    "l2_options",
    "l3_technical",
    "l4_blocking",
    "l5_mtf",
    "composite_score",
    "trend_15m",
    "breakout_up",
    "breakout_down",
    "structure_break",
    "range_compression",
    "failure_window",
    "sl_hits_today",
    "choppiness",
    "mtf_confluence",
    "session_bias",
];

/// Named slot indices. Positions must match `FEATURE_NAMES`.
pub mod idx {
    pub const EMA_5: usize = 0;
    pub const EMA_12: usize = 1;
    pub const EMA_20: usize = 2;
    pub const EMA_50: usize = 3;
    pub const EMA_200: usize = 4;
    pub const RSI_14: usize = 5;
    pub const RSI_5: usize = 6;
    pub const MACD: usize = 7;
    pub const MACD_SIGNAL: usize = 8;
    pub const MACD_HIST: usize = 9;
    pub const ADX: usize = 10;
    pub const EMA_ALIGNMENT: usize = 11;
    pub const TREND_REGIME: usize = 12;
    pub const MOMENTUM_10: usize = 13;
    pub const ATR_14: usize = 14;
    pub const PARKINSON_20: usize = 15;
    pub const GARMAN_KLASS_20: usize = 16;
    pub const RETURNS_STD_5: usize = 17;
    pub const RETURNS_STD_20: usize = 18;
    pub const VOL_OF_VOL: usize = 19;
    pub const VOL_OF_VOL_Z: usize = 20;
    pub const RANGE_PCTILE_78: usize = 21;
    pub const CPR_PIVOT: usize = 22;
    pub const CPR_TC: usize = 23;
    pub const CPR_WIDTH: usize = 24;
    pub const CPR_DIST_PIVOT_ATR: usize = 25;
    pub const CPR_DIST_TC_ATR: usize = 26;
    pub const CPR_DIST_BC_ATR: usize = 27;
    pub const VWAP: usize = 28;
    pub const VWAP_DIST_ATR: usize = 29;
    pub const VWAP_SLOPE: usize = 30;
    pub const NEAREST_RESISTANCE: usize = 31;
    pub const NEAREST_SUPPORT: usize = 32;
    pub const RESISTANCE_TOUCHES: usize = 33;
    pub const SUPPORT_TOUCHES: usize = 34;
    pub const DIST_RESISTANCE_PTS: usize = 35;
    pub const DIST_SUPPORT_PTS: usize = 36;
    pub const DIST_RESISTANCE_ATR: usize = 37;
    pub const DIST_SUPPORT_ATR: usize = 38;
    pub const TICK_DIRECTION_RATIO: usize = 39;
    pub const ORDER_FLOW_IMBALANCE: usize = 40;
    pub const UPPER_WICK_RATIO: usize = 41;
    pub const LOWER_WICK_RATIO: usize = 42;
    pub const BODY_RATIO: usize = 43;
    pub const GAP_PCT: usize = 44;
    pub const OPENING_RANGE_POS: usize = 45;
    pub const VOLUME_ZSCORE: usize = 46;
    pub const CUM_SIGNED_VOLUME: usize = 47;
    pub const SPREAD_PROXY: usize = 48;
    pub const PCR: usize = 49;
    pub const OI_SKEW: usize = 50;
    pub const IV_SKEW: usize = 51;
    pub const ATM_IV_RANK: usize = 52;
    pub const INST_ACTIVITY: usize = 53;
    pub const HOUR: usize = 54;
    pub const MINUTE: usize = 55;
    pub const MINUTE_OF_DAY: usize = 56;
    pub const MARKET_PHASE: usize = 57;
    pub const L1_STRUCTURE: usize = 58;
    pub const L2_OPTIONS: usize = 59;
    pub const L3_TECHNICAL: usize = 60;
    pub const L4_BLOCKING: usize = 61;
    pub const L5_MTF: usize = 62;
    pub const COMPOSITE_SCORE: usize = 63;
    pub const TREND_15M: usize = 64;
    pub const BREAKOUT_UP: usize = 65;
    pub const BREAKOUT_DOWN: usize = 66;
    pub const STRUCTURE_BREAK: usize = 67;
    pub const RANGE_COMPRESSION: usize = 68;
    pub const FAILURE_WINDOW: usize = 69;
    pub const SL_HITS_TODAY: usize = 70;
    pub const CHOPPINESS: usize = 71;
    pub const MTF_CONFLUENCE: usize = 72;
    pub const SESSION_BIAS: usize = 73;
}

/// A populated feature vector plus its staleness flag.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
    /// True when option-chain slots were filled from a snapshot older than
    /// the allowed staleness window.
    pub feature_stale: bool,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
            feature_stale: false,
        }
    }
}

impl FeatureVector {
    pub fn get(&self, slot: usize) -> f64 {
        self.values[slot]
    }

    /// Set a slot, substituting the sentinel for non-finite values.
    pub fn set(&mut self, slot: usize, value: f64) {
        self.values[slot] = if value.is_finite() { value } else { 0.0 };
    }

    pub fn by_name(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// All slots finite. Producers uphold this; consumers may assert it.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Serialize as a name-keyed JSON object (the stored blob format).
    pub fn to_json(&self) -> Value {
        let mut map = Map::with_capacity(FEATURE_COUNT);
        for (name, value) in FEATURE_NAMES.iter().zip(self.values.iter()) {
            map.insert(
                (*name).to_string(),
                serde_json::Number::from_f64(*value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        }
        Value::Object(map)
    }

    /// Rebuild from the stored blob. Missing or non-numeric slots become the
    /// sentinel so old rows stay readable.
    pub fn from_json(value: &Value) -> Self {
        let mut fv = Self::default();
        if let Value::Object(map) = value {
            for (i, name) in FEATURE_NAMES.iter().enumerate() {
                if let Some(v) = map.get(*name).and_then(Value::as_f64) {
                    fv.set(i, v);
                }
            }
        }
        fv
    }
}
