//! Cadence scheduler: every 15 minutes inside market hours, refresh the
//! option chain, evaluate the pipeline on a copy of the candle window, and
//! either HOLD the active plan or persist a new snapshot.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use drishti_broker::BrokerClient;
use drishti_features::DayContext;
use drishti_models::{
    Action, ActivePosition, Candle, CandleBuffer, Outcome, PositionStatus,
};
use drishti_signal::{state, PipelineState, SignalPipeline};
use drishti_store::MetricsRepository;

use crate::config::SymbolConfig;

const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

/// Hard cap on one cadence invocation; overruns are abandoned.
const INVOCATION_CAP: Duration = Duration::from_secs(10);

/// Per-symbol scheduler task.
pub struct CadenceScheduler {
    pipeline: SignalPipeline,
    state: Arc<RwLock<PipelineState>>,
    repo: Arc<MetricsRepository>,
    buffer: Arc<RwLock<CandleBuffer>>,
    broker: BrokerClient,
    symbol: SymbolConfig,
    cadence: Duration,
    validity_secs: i64,
    open_min: i64,
    close_min: i64,
    retention_days: u32,
    last_purge_day: String,
}

impl CadenceScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pipeline: SignalPipeline,
        state: Arc<RwLock<PipelineState>>,
        repo: Arc<MetricsRepository>,
        buffer: Arc<RwLock<CandleBuffer>>,
        broker: BrokerClient,
        symbol: SymbolConfig,
        cadence_seconds: u64,
        validity_secs: i64,
        open_min: i64,
        close_min: i64,
        retention_days: u32,
    ) -> Self {
        Self {
            pipeline,
            state,
            repo,
            buffer,
            broker,
            symbol,
            cadence: Duration::from_secs(cadence_seconds),
            validity_secs,
            open_min,
            close_min,
            retention_days,
            last_purge_day: String::new(),
        }
    }

    /// Run forever. Each invocation is capped; an overrun or error never
    /// stops the cadence.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.cadence);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            match tokio::time::timeout(INVOCATION_CAP, self.tick(now)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(symbol = %self.symbol.name, error = %e, "[CADENCE] invocation failed"),
                Err(_) => warn!(symbol = %self.symbol.name, "[CADENCE] invocation exceeded cap, abandoned"),
            }
        }
    }

    /// One cadence evaluation at `now` (epoch seconds UTC).
    pub async fn tick(&mut self, now: i64) -> Result<()> {
        let ist_minute = (now + IST_OFFSET_SECS).rem_euclid(86_400) / 60;
        if ist_minute < self.open_min || ist_minute >= self.close_min {
            return Ok(());
        }

        let date = ist_date(now);
        self.state.write().expect("state lock").roll_day(&date);

        let today_start = now - (now + IST_OFFSET_SECS).rem_euclid(86_400);
        let yesterday_start = today_start - 86_400;
        let prev_losses = self
            .repo
            .sl_hits_since(&self.symbol.name, yesterday_start)?
            .saturating_sub(self.repo.sl_hits_since(&self.symbol.name, today_start)?);
        let prev_count = self
            .repo
            .count_since(&self.symbol.name, yesterday_start)?
            .saturating_sub(self.repo.count_since(&self.symbol.name, today_start)?);
        state::roll_decay_for_day(&self.repo, &self.symbol.name, &date, prev_losses, prev_count);

        self.expire_active_if_due(now)?;
        self.refresh_chain().await;

        // Copy the window under a short lock; aggregation continues behind.
        let window = self.buffer.read().expect("buffer lock").all();

        let sl_hits_today = self.repo.sl_hits_since(&self.symbol.name, today_start)?;
        let daily_pl = self.state.read().expect("state lock").daily_realized_pl;
        let ctx = day_context(&window, sl_hits_today);

        let eval = self
            .pipeline
            .evaluate(&window, &ctx, daily_pl, now)
            .map_err(anyhow::Error::from)?;

        // HOLD: the active plan is still valid and the market structure
        // (condition, predicted direction) has not moved.
        let hold = {
            let st = self.state.read().expect("state lock");
            match (&st.active_position, &eval.snapshot.prediction) {
                (Some(ap), Some(pred)) => {
                    ap.is_valid_at(now)
                        && !ap.outcome_recorded
                        && ap.condition == eval.condition
                        && ap.plan.direction == pred.direction
                }
                _ => false,
            }
        };
        if hold {
            let mut st = self.state.write().expect("state lock");
            if let Some(ap) = st.active_position.as_mut() {
                ap.status = PositionStatus::Hold;
            }
            st.last_action = Some(Action::Hold);
            st.last_cadence_ts = now;
            info!(symbol = %self.symbol.name, "[CADENCE] holding active plan");
            return Ok(());
        }

        let id = self.repo.put(&eval.snapshot)?;
        self.repo.put_structure(
            now,
            &self.symbol.name,
            eval.condition,
            eval.structure.support,
            eval.structure.resistance,
            eval.structure.vwap,
            eval.structure.cpr_pivot,
        )?;
        self.repo.update_daily_summary(&self.symbol.name, &date)?;

        let mut st = self.state.write().expect("state lock");
        match eval.plan {
            Some(plan) => {
                info!(
                    symbol = %self.symbol.name,
                    direction = %plan.direction,
                    entry = plan.entry,
                    target = plan.target,
                    stoploss = plan.stoploss,
                    lots = plan.position_size_lots,
                    "[CADENCE] plan emitted"
                );
                st.active_position = Some(ActivePosition {
                    condition: eval.condition,
                    snapshot_id: id,
                    emitted_at: now,
                    valid_until: now + self.validity_secs,
                    status: PositionStatus::Open,
                    outcome_recorded: false,
                    plan,
                });
                st.last_action = Some(Action::Trade);
            }
            None => {
                st.last_action = Some(Action::Wait);
            }
        }
        st.last_cadence_ts = now;
        drop(st);

        if self.last_purge_day != date {
            self.repo.purge(self.retention_days, now)?;
            self.last_purge_day = date;
        }

        Ok(())
    }

    /// A plan whose validity window lapsed without touching either level is
    /// closed as EXPIRED, exactly once.
    fn expire_active_if_due(&self, now: i64) -> Result<()> {
        let due = {
            let st = self.state.read().expect("state lock");
            match &st.active_position {
                Some(ap) if now >= ap.valid_until && !ap.outcome_recorded => {
                    Some(ap.snapshot_id)
                }
                _ => None,
            }
        };
        if let Some(id) = due {
            let updated = self.repo.update_outcome(id, Outcome::Expired, 0.0, now)?;
            let mut st = self.state.write().expect("state lock");
            if let Some(ap) = st.active_position.as_mut() {
                ap.outcome_recorded = true;
                ap.status = PositionStatus::Closed;
            }
            if updated {
                info!(symbol = %self.symbol.name, snapshot_id = id, "[CADENCE] plan expired untouched");
            }
        }
        Ok(())
    }

    async fn refresh_chain(&mut self) {
        let expiry = match &self.symbol.expiry {
            Some(e) => e.clone(),
            None => return,
        };
        match self
            .broker
            .option_chain(
                &self.symbol.name,
                self.symbol.underlying_scrip,
                &self.symbol.underlying_seg,
                &expiry,
            )
            .await
        {
            Ok(chain) => self.pipeline.engineer_mut().set_chain(chain),
            Err(e) => {
                warn!(symbol = %self.symbol.name, error = %e, "[CADENCE] option chain refresh failed");
            }
        }
    }
}

/// IST calendar date for a UTC timestamp.
pub fn ist_date(now_utc: i64) -> String {
    drishti_models::to_ist(now_utc).format("%Y-%m-%d").to_string()
}

/// Build the day context from the window: previous IST day's HLC for the
/// CPR band, prior day extremes as the cached level set.
pub fn day_context(window: &[Candle], sl_hits_today: u32) -> DayContext {
    let mut ctx = DayContext {
        sl_hits_today,
        failure_window: sl_hits_today >= 3,
        ..Default::default()
    };

    let today = match window.last() {
        Some(c) => c.time.div_euclid(86_400),
        None => return ctx,
    };

    let mut prev_day: Option<i64> = None;
    for c in window.iter().rev() {
        let day = c.time.div_euclid(86_400);
        if day < today {
            prev_day = Some(day);
            break;
        }
    }

    if let Some(prev) = prev_day {
        let bars: Vec<&Candle> = window
            .iter()
            .filter(|c| c.time.div_euclid(86_400) == prev)
            .collect();
        if let Some(last) = bars.last() {
            ctx.prev_day_close = last.close;
        }
        ctx.prev_day_high = bars.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        ctx.prev_day_low = bars.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    }

    // Prior-day extremes become the historical level set (up to 5 days).
    let mut days: Vec<i64> = window
        .iter()
        .map(|c| c.time.div_euclid(86_400))
        .filter(|d| *d < today)
        .collect();
    days.sort_unstable();
    days.dedup();
    for day in days.into_iter().rev().take(5) {
        let bars: Vec<&Candle> = window
            .iter()
            .filter(|c| c.time.div_euclid(86_400) == day)
            .collect();
        let high = bars.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        ctx.historical_levels.push(high);
        ctx.historical_levels.push(low);
    }

    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_broker::{BrokerConfig, Credentials};
    use drishti_models::BAR_SECS;
    use drishti_signal::{GradientBoosted, PipelineConfig, Predictor};

    fn broker() -> BrokerClient {
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

    fn symbol() -> SymbolConfig {
        SymbolConfig {
            name: "NIFTY".into(),
            security_id: 13,
            exchange_segment: "IDX_I".into(),
            lot_size: 65,
            strike_step: 50.0,
            underlying_scrip: 13,
            underlying_seg: "IDX_I".into(),
            expiry: None,
        }
    }

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            symbol: "NIFTY".into(),
            lot_size: 65,
            base_lots: 2,
            max_per_trade_loss: 2_000.0,
            max_daily_loss: 6_000.0,
            confidence_floor: 60.0,
            confidence_ceiling: 75.0,
            strike_step: 50.0,
            risk_free_rate: 0.065,
            time_to_expiry_years: 2.0 / 365.0,
        }
    }

    /// The sklearn-export fixture from the predictor tests: splits on
    /// rsi_14 at 50, leaning up above it.
    fn model_json() -> String {
        let names: Vec<String> = drishti_models::FEATURE_NAMES
            .iter()
            .map(|n| format!("\"{n}\""))
            .collect();
        format!(
            r#"{{
            "model_type": "gradient_boosted",
            "feature_names": [{names}],
            "n_features": 74,
            "n_classes": 2,
            "n_estimators": 1,
            "learning_rate": 0.5,
            "init_value": [0.0, 0.0],
            "stages": [[
                {{"nodes": [
                    {{"feature": 5, "threshold": 50.0, "left": 1, "right": 2, "value": null}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": 2.0}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": -2.0}}
                ]}},
                {{"nodes": [
                    {{"feature": 5, "threshold": 50.0, "left": 1, "right": 2, "value": null}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": -2.0}},
                    {{"feature": -1, "threshold": 0.0, "left": -1, "right": -1, "value": 2.0}}
                ]}}
            ]]
        }}"#,
            names = names.join(",")
        )
    }

    /// Bars per 09:15–15:30 session.
    const BARS_PER_DAY: usize = 75;

    /// Session-aligned trending tape spanning consecutive trading days, so
    /// the final bar lands mid-session and the previous day is complete.
    fn seeded_buffer(n: usize) -> (Arc<RwLock<CandleBuffer>>, i64) {
        let session_open = (9 * 60 + 15) * 60;
        let mut buffer = CandleBuffer::new(512);
        let candles: Vec<Candle> = (0..n)
            .map(|i| {
                let day = (i / BARS_PER_DAY) as i64;
                let slot = (i % BARS_PER_DAY) as i64;
                let drift = if i % 5 == 4 { -0.4 } else { 0.2 };
                let base = 24_000.0 + (i as f64 * 0.2) + drift;
                let half_range = 7.0 + ((i + 2) % 5) as f64;
                Candle {
                    time: (20_000 + day) * 86_400 + session_open + slot * BAR_SECS,
                    open: base - 1.0,
                    high: base + half_range,
                    low: base - half_range,
                    close: base + 1.0,
                    volume: 10_000,
                }
            })
            .collect();
        buffer.seed(candles);
        let last = buffer.last().unwrap().time;
        // Matching UTC instant for the last bar's IST wall clock.
        (Arc::new(RwLock::new(buffer)), last - IST_OFFSET_SECS)
    }

    fn scheduler(
        repo: Arc<MetricsRepository>,
        buffer: Arc<RwLock<CandleBuffer>>,
    ) -> (CadenceScheduler, Arc<RwLock<PipelineState>>) {
        let model = GradientBoosted::from_json_str(&model_json()).unwrap();
        let pipeline =
            SignalPipeline::new(pipeline_config(), Predictor::with_model(model), repo.clone());
        let state = Arc::new(RwLock::new(PipelineState::default()));
        let scheduler = CadenceScheduler::new(
            pipeline,
            state.clone(),
            repo,
            buffer,
            broker(),
            symbol(),
            900,
            900,
            9 * 60 + 15,
            15 * 60 + 30,
            30,
        );
        (scheduler, state)
    }

    #[tokio::test]
    async fn cadence_emits_then_holds() {
        let repo = Arc::new(MetricsRepository::open_in_memory().unwrap());
        let (buffer, now) = seeded_buffer(240);
        let (mut sched, state) = scheduler(repo.clone(), buffer);

        sched.tick(now).await.unwrap();
        assert_eq!(repo.count_since("NIFTY", 0).unwrap(), 1);
        {
            let st = state.read().unwrap();
            assert_eq!(st.last_action, Some(Action::Trade));
            assert!(st.active_position.is_some());
        }

        // Five minutes later on an unchanged buffer: HOLD, no new snapshot.
        sched.tick(now + 300).await.unwrap();
        assert_eq!(repo.count_since("NIFTY", 0).unwrap(), 1);
        let st = state.read().unwrap();
        assert_eq!(st.last_action, Some(Action::Hold));
        assert_eq!(
            st.active_position.as_ref().unwrap().status,
            PositionStatus::Hold
        );
    }

    #[tokio::test]
    async fn outside_market_hours_is_noop() {
        let repo = Arc::new(MetricsRepository::open_in_memory().unwrap());
        let (buffer, now) = seeded_buffer(240);
        let (mut sched, _state) = scheduler(repo.clone(), buffer);

        // 02:00 IST the same day.
        let night = now - now.rem_euclid(86_400); // blunt, but well outside session
        sched.tick(night).await.unwrap();
        assert_eq!(repo.count_since("NIFTY", 0).unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_plan_is_closed_once() {
        let repo = Arc::new(MetricsRepository::open_in_memory().unwrap());
        let (buffer, now) = seeded_buffer(240);
        let (mut sched, state) = scheduler(repo.clone(), buffer);

        sched.tick(now).await.unwrap();
        let id = state
            .read()
            .unwrap()
            .active_position
            .as_ref()
            .unwrap()
            .snapshot_id;

        // Past the validity window: the old snapshot resolves EXPIRED and a
        // fresh evaluation is persisted.
        sched.tick(now + 1_000).await.unwrap();
        let snaps = repo.recent("NIFTY", 10).unwrap();
        let expired = snaps.iter().find(|s| s.id == id).unwrap();
        assert_eq!(expired.outcome, Outcome::Expired);
        assert_eq!(repo.count_since("NIFTY", 0).unwrap(), 2);

        // A second pass over the same instant does not touch the row again.
        let untouched = repo.update_outcome(id, Outcome::Loss, -1.0, now + 1_100).unwrap();
        assert!(!untouched);
    }

    #[test]
    fn day_context_uses_previous_day() {
        let day0 = 20_000 * 86_400 + (9 * 60 + 15) * 60;
        let day1 = day0 + 86_400;
        let mut window: Vec<Candle> = (0..10)
            .map(|i| Candle {
                time: day0 + i * BAR_SECS,
                open: 100.0,
                high: 110.0 + i as f64,
                low: 90.0 - i as f64,
                close: 105.0,
                volume: 10,
            })
            .collect();
        window.push(Candle {
            time: day1,
            open: 106.0,
            high: 108.0,
            low: 104.0,
            close: 107.0,
            volume: 10,
        });

        let ctx = day_context(&window, 1);
        assert_eq!(ctx.prev_day_high, 119.0);
        assert_eq!(ctx.prev_day_low, 81.0);
        assert_eq!(ctx.prev_day_close, 105.0);
        assert_eq!(ctx.sl_hits_today, 1);
        assert!(!ctx.failure_window);
        assert_eq!(ctx.historical_levels, vec![119.0, 81.0]);
    }
}
