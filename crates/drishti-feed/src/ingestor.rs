//! Websocket tick ingestor.
//!
//! Maintains the feed connection, aggregates ticks into the shared candle
//! buffer during market hours, and fans ticks out to subscribers (the
//! outcome watcher via broadcast, the dashboard via a latest-value watch
//! channel sampled on its own throttle).
//!
//! Reconnection: capped exponential backoff with jitter. A 401/403 during
//! the handshake triggers one token refresh and an immediate retry before
//! backoff resumes; a failed refresh halts the ingestor with an
//! operator-visible status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, info, warn};

use drishti_broker::BrokerClient;
use drishti_models::{CandleBuffer, Tick};

use crate::ticks::{parse_frame, Instrument, SubscribeRequest};

/// Reconnect backoff steps in seconds, capped at the last entry.
const BACKOFF_SECS: [u64; 6] = [1, 2, 4, 8, 16, 30];

/// Ingestor tuning.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Reconnect when nothing arrives for this long.
    pub idle_timeout_secs: u64,
    /// Session window in minutes after IST midnight; bars are only built
    /// inside it. The socket stays connected outside the window.
    pub market_open_min: i64,
    pub market_close_min: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            market_open_min: 9 * 60 + 15,
            market_close_min: 15 * 60 + 30,
        }
    }
}

/// Operator-visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Connected,
    Reconnecting,
    AuthFailed,
    Stopped,
}

/// The ingestor task and its shared outputs.
pub struct TickIngestor {
    client: BrokerClient,
    config: FeedConfig,
    instruments: Vec<Instrument>,
    security_ids: Vec<u32>,
    /// One live buffer per subscribed security.
    buffers: HashMap<u32, Arc<RwLock<CandleBuffer>>>,
    tick_tx: broadcast::Sender<Tick>,
    latest_tx: watch::Sender<Option<Tick>>,
    status: Arc<RwLock<FeedStatus>>,
    running: Arc<AtomicBool>,
}

impl TickIngestor {
    pub fn new(
        client: BrokerClient,
        config: FeedConfig,
        instruments: Vec<Instrument>,
        buffers: HashMap<u32, Arc<RwLock<CandleBuffer>>>,
    ) -> Self {
        let security_ids = instruments
            .iter()
            .filter_map(|i| i.security_id.parse().ok())
            .collect();
        let (tick_tx, _) = broadcast::channel(1_024);
        let (latest_tx, _) = watch::channel(None);
        Self {
            client,
            config,
            instruments,
            security_ids,
            buffers,
            tick_tx,
            latest_tx,
            status: Arc::new(RwLock::new(FeedStatus::Connecting)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Every tick, for the outcome watcher.
    pub fn subscribe_ticks(&self) -> broadcast::Receiver<Tick> {
        self.tick_tx.subscribe()
    }

    /// Latest tick only; dashboard subscribers sample this on their own
    /// 100 ms throttle so a burst collapses to the newest print.
    pub fn latest_tick(&self) -> watch::Receiver<Option<Tick>> {
        self.latest_tx.subscribe()
    }

    pub fn status(&self) -> FeedStatus {
        *self.status.read().expect("status lock")
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    fn set_status(&self, status: FeedStatus) {
        *self.status.write().expect("status lock") = status;
    }

    /// Run until stopped or authentication becomes unrecoverable.
    pub async fn run(&self) {
        let mut backoff_idx = 0usize;
        let mut auth_retry_done = false;

        while self.running.load(Ordering::SeqCst) {
            self.set_status(if backoff_idx == 0 {
                FeedStatus::Connecting
            } else {
                FeedStatus::Reconnecting
            });

            let mut connected = false;
            match self.run_connection(&mut connected).await {
                Ok(()) => {
                    info!("[FEED] connection closed cleanly");
                    break;
                }
                Err(e) => {
                    // A drop after a healthy session starts a fresh episode:
                    // the backoff ladder restarts and the next 401 earns its
                    // own refresh attempt.
                    if connected {
                        backoff_idx = 0;
                        auth_retry_done = false;
                    }

                    if is_auth_error(&e) {
                        if auth_retry_done {
                            error!("[FEED] authentication failed after refresh, halting");
                            self.set_status(FeedStatus::AuthFailed);
                            return;
                        }
                        warn!("[FEED] feed rejected credentials, refreshing token");
                        match self.client.refresh_token().await {
                            Ok(()) => {
                                auth_retry_done = true;
                                // Immediate retry with the fresh token.
                                continue;
                            }
                            Err(refresh_err) => {
                                error!(error = %refresh_err, "[FEED] token refresh failed, halting");
                                self.set_status(FeedStatus::AuthFailed);
                                return;
                            }
                        }
                    }

                    let base = BACKOFF_SECS[backoff_idx.min(BACKOFF_SECS.len() - 1)];
                    let jitter_ms = rand::thread_rng().gen_range(0..500);
                    warn!(error = %e, delay_secs = base, "[FEED] reconnecting");
                    tokio::time::sleep(Duration::from_secs(base) + Duration::from_millis(jitter_ms))
                        .await;
                    backoff_idx = (backoff_idx + 1).min(BACKOFF_SECS.len() - 1);
                }
            }
        }

        self.set_status(FeedStatus::Stopped);
    }

    /// Runs one connection session. Sets `connected` once the handshake
    /// succeeds so the caller can distinguish a failed dial from a dropped
    /// session.
    async fn run_connection(&self, connected: &mut bool) -> anyhow::Result<()> {
        let url = self.client.credentials().ws_url().await;
        let (ws, _) = tokio_tungstenite::connect_async(&url).await?;
        let (mut write, mut read) = ws.split();

        *connected = true;
        self.set_status(FeedStatus::Connected);
        info!(instruments = self.instruments.len(), "[FEED] websocket connected");

        let subscribe = SubscribeRequest::ticker(self.instruments.clone());
        write
            .send(Message::Text(serde_json::to_string(&subscribe)?))
            .await?;

        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        loop {
            if !self.running.load(Ordering::SeqCst) {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }

            let msg = match tokio::time::timeout(idle, read.next()).await {
                Ok(Some(msg)) => msg?,
                Ok(None) => anyhow::bail!("stream ended"),
                Err(_) => anyhow::bail!("idle timeout, no data for {}s", idle.as_secs()),
            };

            match msg {
                Message::Binary(data) => self.on_frame(&data),
                Message::Ping(payload) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Message::Text(text) => {
                    if text.len() > 2 {
                        debug!(msg = %text, "[FEED] text message");
                    }
                }
                Message::Close(frame) => {
                    anyhow::bail!("server closed connection: {frame:?}");
                }
                _ => {}
            }
        }
    }

    fn on_frame(&self, data: &[u8]) {
        let (ticks, dropped) = parse_frame(data, &self.security_ids);
        if dropped > 0 {
            debug!(dropped, "[FEED] dropped packets in frame");
        }
        for tick in ticks {
            if self.in_session(tick.ts) {
                if let Some(buffer) = self.buffers.get(&tick.security_id) {
                    if let Ok(mut buffer) = buffer.write() {
                        buffer.on_tick(&tick);
                    }
                }
            }
            let _ = self.tick_tx.send(tick);
            let _ = self.latest_tx.send(Some(tick));
        }
    }

    /// Bars are built only inside the session window. Tick timestamps are
    /// IST wall-clock epoch seconds.
    fn in_session(&self, ts: i64) -> bool {
        let minute = ts.rem_euclid(86_400) / 60;
        minute >= self.config.market_open_min && minute < self.config.market_close_min
    }
}

fn is_auth_error(e: &anyhow::Error) -> bool {
    match e.downcast_ref::<WsError>() {
        Some(WsError::Http(resp)) => {
            let code = resp.status().as_u16();
            code == 401 || code == 403
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticks::encode_ticker;
    use drishti_broker::{BrokerConfig, Credentials};
    use drishti_models::BAR_SECS;

    fn test_client() -> BrokerClient {
        BrokerClient::new(Credentials::new(BrokerConfig {
            base_url: "https://api.example.test/v2".into(),
            ws_host: "feed.example.test".into(),
            client_id: "C1".into(),
            api_key: "k".into(),
            api_secret: "s".into(),
            access_token: "t".into(),
            token_expiry: None,
        }))
        .unwrap()
    }

    fn ingestor() -> TickIngestor {
        let mut buffers = HashMap::new();
        buffers.insert(13, Arc::new(RwLock::new(CandleBuffer::new(64))));
        TickIngestor::new(
            test_client(),
            FeedConfig::default(),
            vec![Instrument {
                exchange_segment: "IDX_I".into(),
                security_id: "13".into(),
            }],
            buffers,
        )
    }

    fn buffer_of(ing: &TickIngestor, id: u32) -> Arc<RwLock<CandleBuffer>> {
        ing.buffers.get(&id).unwrap().clone()
    }

    /// 10:00 IST on an arbitrary day, as an IST-aligned epoch.
    fn session_ts(offset_secs: i64) -> i64 {
        20_000 * 86_400 + 10 * 3_600 + offset_secs
    }

    #[test]
    fn frames_aggregate_into_buffer_during_session() {
        let ing = ingestor();
        let t0 = session_ts(0) - session_ts(0) % BAR_SECS;

        ing.on_frame(&encode_ticker(13, 0, 24_000.0, t0 as u32));
        ing.on_frame(&encode_ticker(13, 0, 24_005.0, (t0 + 30) as u32));
        ing.on_frame(&encode_ticker(13, 0, 23_998.0, (t0 + 60) as u32));

        let buffer = buffer_of(&ing, 13);
        let buffer = buffer.read().unwrap();
        assert_eq!(buffer.len(), 1);
        let live = buffer.last().unwrap();
        assert_eq!(live.high, 24_005.0);
        assert_eq!(live.low, 23_998.0);
        assert_eq!(live.close, 23_998.0);
    }

    #[test]
    fn out_of_session_ticks_build_no_bars_but_still_fan_out() {
        let ing = ingestor();
        let mut rx = ing.subscribe_ticks();
        let night = 20_000 * 86_400 + 2 * 3_600; // 02:00 IST

        ing.on_frame(&encode_ticker(13, 0, 24_000.0, night as u32));

        assert!(buffer_of(&ing, 13).read().unwrap().is_empty());
        let tick = rx.try_recv().unwrap();
        assert_eq!(tick.ltp, 24_000.0);
    }

    #[test]
    fn latest_watch_collapses_bursts() {
        let ing = ingestor();
        let rx = ing.latest_tick();
        let t0 = session_ts(0);

        for (i, px) in [24_000.0, 24_001.0, 24_002.5].iter().enumerate() {
            ing.on_frame(&encode_ticker(13, 0, *px as f32, (t0 + i as i64) as u32));
        }

        let latest = rx.borrow().expect("tick present");
        assert!((latest.ltp - 24_002.5).abs() < 1e-3);
    }

    #[test]
    fn session_window_boundaries() {
        let ing = ingestor();
        let day = 20_000 * 86_400;
        assert!(!ing.in_session(day + (9 * 60 + 14) * 60));
        assert!(ing.in_session(day + (9 * 60 + 15) * 60));
        assert!(ing.in_session(day + (15 * 60 + 29) * 60));
        assert!(!ing.in_session(day + (15 * 60 + 30) * 60));
    }

    #[test]
    fn status_transitions_are_visible() {
        let ing = ingestor();
        assert_eq!(ing.status(), FeedStatus::Connecting);
        ing.set_status(FeedStatus::Connected);
        assert_eq!(ing.status(), FeedStatus::Connected);
    }
}
