//! # Drishti Models
//!
//! Shared data model for the intraday signal engine: candles and the live
//! candle buffer, the fixed 74-slot feature schema, classification enums,
//! trade plans, persisted snapshots, and the typed error kinds that cross
//! crate boundaries.
//!
//! Everything here is plain data; behavior lives in the owning crates
//! (features, signal, feed, store).

pub mod candle;
pub mod chain;
pub mod error;
pub mod features;
pub mod plan;
pub mod snapshot;

pub use candle::{Candle, CandleBuffer, Tick, BAR_SECS};
pub use chain::{ChainRow, ChainSnapshot};
pub use error::EngineError;
pub use features::{idx, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use plan::{
    Action, Direction, MarketCondition, OptionType, Prediction, SetupQuality, TradeParams,
    TradePlan,
};
pub use snapshot::{
    ActivePosition, FilterResult, FilterStatus, Outcome, OutcomeEvent, PositionStatus, Snapshot,
};

use chrono::{DateTime, FixedOffset};

/// IST offset (+05:30). All candle times and session boundaries are IST.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("static offset")
}

/// Convert an epoch-seconds UTC timestamp into IST wall-clock time.
pub fn to_ist(epoch_secs: i64) -> DateTime<FixedOffset> {
    DateTime::from_timestamp(epoch_secs, 0)
        .unwrap_or_default()
        .with_timezone(&ist())
}

/// Minutes since IST midnight for an epoch-seconds timestamp.
pub fn ist_minute_of_day(epoch_secs: i64) -> u32 {
    use chrono::Timelike;
    let t = to_ist(epoch_secs);
    t.hour() * 60 + t.minute()
}
