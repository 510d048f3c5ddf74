//! Route handlers for the dashboard surface.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use drishti_models::{Action, PositionStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::{ApiState, SymbolHandle};

/// Stream pushes are throttled to one per subscriber per this interval;
/// ticks inside a window collapse to the latest.
const STREAM_THROTTLE: Duration = Duration::from_millis(100);

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct CandlesQuery {
    pub symbol: String,
    #[serde(default)]
    pub interval: Option<u32>,
    #[serde(default)]
    pub days: Option<u32>,
}

/// `GET /api/candles?symbol=&interval=&days=`
pub async fn get_candles(
    State(state): State<ApiState>,
    Query(q): Query<CandlesQuery>,
) -> ApiResult<Json<Value>> {
    if let Some(interval) = q.interval {
        if interval != 5 {
            return Err(ApiError::bad_request("only the 5-minute interval is served"));
        }
    }
    let handle = state
        .symbol(&q.symbol)
        .ok_or_else(|| ApiError::not_found(format!("unknown symbol {}", q.symbol)))?;
    Ok(Json(candles_payload(handle, q.days.unwrap_or(1))))
}

pub(crate) fn candles_payload(handle: &SymbolHandle, days: u32) -> Value {
    // 78 five-minute bars per session day.
    let bars = (days.max(1) as usize) * 78;
    let buffer = handle.buffer.read().expect("buffer lock");
    let window = buffer.window(bars);
    let last_price = buffer.last_price();

    json!({
        "candles": window
            .iter()
            .map(|c| json!({
                "time": c.time,
                "open": c.open,
                "high": c.high,
                "low": c.low,
                "close": c.close,
            }))
            .collect::<Vec<_>>(),
        "last_price": last_price,
    })
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
}

/// `GET /api/levels?symbol=` — current plan, or HOLD/WAIT.
pub async fn get_levels(
    State(state): State<ApiState>,
    Query(q): Query<SymbolQuery>,
) -> ApiResult<Json<Value>> {
    let handle = state
        .symbol(&q.symbol)
        .ok_or_else(|| ApiError::not_found(format!("unknown symbol {}", q.symbol)))?;
    Ok(Json(levels_payload(handle, now_epoch())))
}

pub(crate) fn levels_payload(handle: &SymbolHandle, now: i64) -> Value {
    let state = handle.state.read().expect("state lock");

    match &state.active_position {
        Some(ap) if ap.is_valid_at(now) => {
            let action = state.last_action.unwrap_or(Action::Hold);
            json!({
                "action": action.as_str(),
                "position_status": ap.status.as_str(),
                "valid_until": ap.valid_until,
                "plan": ap.plan,
            })
        }
        Some(ap) => json!({
            "action": Action::Wait.as_str(),
            "position_status": PositionStatus::Closed.as_str(),
            "valid_until": ap.valid_until,
            "plan": Value::Null,
        }),
        None => json!({
            "action": Action::Wait.as_str(),
            "position_status": Value::Null,
            "plan": Value::Null,
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default)]
    pub days: Option<u32>,
}

/// `GET /api/stats?days=`
pub async fn get_stats(
    State(state): State<ApiState>,
    Query(q): Query<StatsQuery>,
) -> ApiResult<Json<Value>> {
    let stats = state.repo.stats(q.days.unwrap_or(7), now_epoch())?;
    Ok(Json(json!({
        "window_days": stats.window_days,
        "total": stats.total,
        "wins": stats.wins,
        "losses": stats.losses,
        "win_rate": stats.win_rate,
        "total_pl": stats.total_pl,
        "avg_win_duration_secs": stats.avg_win_duration_secs,
        "best_hour": stats.best_hour,
    })))
}

/// `GET /api/health`
pub async fn get_health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `WS /ws/stream?symbol=` — throttled tick fanout plus outcome events.
pub async fn ws_stream(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Query(q): Query<SymbolQuery>,
) -> impl IntoResponse {
    let security_id = state.symbol(&q.symbol).map(|h| h.security_id);
    ws.on_upgrade(move |socket| handle_stream(socket, state, security_id))
}

async fn handle_stream(mut socket: WebSocket, state: ApiState, security_id: Option<u32>) {
    let security_id = match security_id {
        Some(id) => id,
        None => {
            let _ = socket
                .send(Message::Text(
                    json!({"error": {"kind": "NotFound", "message": "unknown symbol"}}).to_string(),
                ))
                .await;
            return;
        }
    };

    debug!(security_id, "stream client connected");
    let latest = state.latest_tick.clone();
    let mut outcomes = state.outcome_tx.subscribe();
    let mut throttle = tokio::time::interval(STREAM_THROTTLE);
    let mut last_sent: Option<(i64, f64)> = None;

    loop {
        tokio::select! {
            // Throttled tick sampling: at most one push per window, always
            // the newest print.
            _ = throttle.tick() => {
                let tick = *latest.borrow();
                if let Some(tick) = tick {
                    if tick.security_id != security_id {
                        continue;
                    }
                    let key = (tick.ts, tick.ltp);
                    if last_sent == Some(key) {
                        continue;
                    }
                    last_sent = Some(key);
                    let msg = json!({"ltp": tick.ltp, "ts": tick.ts}).to_string();
                    if socket.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
            }

            outcome = outcomes.recv() => {
                match outcome {
                    Ok(event) => {
                        if event.security_id != security_id {
                            continue;
                        }
                        let msg = json!({
                            "type": "outcome",
                            "outcome": outcome_tag(event.outcome),
                            "direction": event.direction.as_str(),
                            "price": event.price,
                        })
                        .to_string();
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
    debug!(security_id, "stream client disconnected");
}

/// Stream vocabulary for resolved outcomes (TARGET / SL).
fn outcome_tag(outcome: drishti_models::Outcome) -> &'static str {
    match outcome {
        drishti_models::Outcome::Win => "TARGET",
        drishti_models::Outcome::Loss => "SL",
        other => other.as_str(),
    }
}
