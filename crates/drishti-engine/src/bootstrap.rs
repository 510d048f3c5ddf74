//! Startup seeding: pull historical bars so the first cadence has a full
//! feature window.

use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};
use tracing::info;

use drishti_broker::BrokerClient;
use drishti_models::{CandleBuffer, EngineError};

use crate::config::SymbolConfig;

/// Calendar days pulled at startup; generous so five trading days survive
/// weekends and holidays.
const HISTORY_CALENDAR_DAYS: i64 = 9;

/// Fetch history for one symbol and seed its buffer. Returns the number of
/// bars loaded.
pub async fn seed_buffer(
    broker: &BrokerClient,
    symbol: &SymbolConfig,
    buffer: &Arc<RwLock<CandleBuffer>>,
) -> Result<usize, EngineError> {
    let to = Utc::now();
    let from = to - Duration::days(HISTORY_CALENDAR_DAYS);

    let candles = broker
        .historical_candles(
            &symbol.security_id.to_string(),
            &symbol.exchange_segment,
            5,
            &from.format("%Y-%m-%d").to_string(),
            &to.format("%Y-%m-%d").to_string(),
        )
        .await?;

    let mut guard = buffer.write().expect("buffer lock");
    guard.seed(candles);
    let loaded = guard.len();
    drop(guard);

    info!(symbol = %symbol.name, bars = loaded, "candle buffer seeded");
    Ok(loaded)
}
