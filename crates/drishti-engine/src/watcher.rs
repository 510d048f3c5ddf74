//! Outcome watcher: compares live prints against the active plan's levels
//! and resolves each plan at most once.
//!
//! Separate from the ingestor so aggregation never waits on repository
//! writes; at-most-once is guaranteed by the in-memory `outcome_recorded`
//! flag plus the repository's PENDING-only update.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::{info, warn};

use drishti_models::{
    Direction, Outcome, OutcomeEvent, PositionStatus, Tick,
};
use drishti_signal::PipelineState;
use drishti_store::MetricsRepository;

pub struct OutcomeWatcher {
    state: Arc<RwLock<PipelineState>>,
    repo: Arc<MetricsRepository>,
    security_id: u32,
    lot_size: u32,
    outcome_tx: broadcast::Sender<OutcomeEvent>,
}

impl OutcomeWatcher {
    pub fn new(
        state: Arc<RwLock<PipelineState>>,
        repo: Arc<MetricsRepository>,
        security_id: u32,
        lot_size: u32,
        outcome_tx: broadcast::Sender<OutcomeEvent>,
    ) -> Self {
        Self {
            state,
            repo,
            security_id,
            lot_size,
            outcome_tx,
        }
    }

    /// Consume the tick stream until it closes.
    pub async fn run(self, mut ticks: broadcast::Receiver<Tick>) {
        loop {
            match ticks.recv().await {
                Ok(tick) => self.on_tick(&tick),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "[WATCHER] tick stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Check one print against the active plan.
    pub fn on_tick(&self, tick: &Tick) {
        if tick.security_id != self.security_id {
            return;
        }

        // Decide against a snapshot of the plan, then re-check the flag
        // under the write lock before recording.
        let (snapshot_id, direction, outcome, pl) = {
            let st = self.state.read().expect("state lock");
            let ap = match &st.active_position {
                Some(ap) if !ap.outcome_recorded && ap.status != PositionStatus::Closed => ap,
                _ => return,
            };
            let outcome =
                match level_hit(ap.plan.direction, ap.plan.target, ap.plan.stoploss, tick.ltp) {
                    Some(outcome) => outcome,
                    None => return,
                };
            let points = match outcome {
                Outcome::Win => (ap.plan.target - ap.plan.entry).abs(),
                _ => -(ap.plan.entry - ap.plan.stoploss).abs(),
            };
            let pl = points * self.lot_size as f64 * ap.plan.position_size_lots as f64;
            (ap.snapshot_id, ap.plan.direction, outcome, pl)
        };

        let recorded = match self.repo.update_outcome(snapshot_id, outcome, pl, tick.ts) {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(error = %e, snapshot_id, "[WATCHER] outcome write failed");
                return;
            }
        };

        let mut st = self.state.write().expect("state lock");
        if let Some(ap) = st.active_position.as_mut() {
            if ap.snapshot_id == snapshot_id && !ap.outcome_recorded {
                ap.outcome_recorded = true;
                ap.status = PositionStatus::Closed;
                if recorded {
                    st.daily_realized_pl += pl;
                    if outcome == Outcome::Loss {
                        st.daily_sl_hits += 1;
                    }
                    info!(
                        snapshot_id,
                        outcome = %outcome,
                        realized_pl = pl,
                        price = tick.ltp,
                        "[WATCHER] plan resolved"
                    );
                    let _ = self.outcome_tx.send(OutcomeEvent {
                        security_id: self.security_id,
                        outcome,
                        direction,
                        price: tick.ltp,
                    });
                }
            }
        }
    }
}

/// Which level, if any, does this print touch first.
fn level_hit(direction: Direction, target: f64, stoploss: f64, ltp: f64) -> Option<Outcome> {
    match direction {
        Direction::Buy => {
            if ltp >= target {
                Some(Outcome::Win)
            } else if ltp <= stoploss {
                Some(Outcome::Loss)
            } else {
                None
            }
        }
        Direction::Sell => {
            if ltp <= target {
                Some(Outcome::Win)
            } else if ltp >= stoploss {
                Some(Outcome::Loss)
            } else {
                None
            }
        }
    }
}
