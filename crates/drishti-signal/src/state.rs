//! Pipeline state: the adaptive confidence threshold and the active
//! position. Written only by the scheduler task; other tasks read copies.

use drishti_models::{Action, ActivePosition};
use drishti_store::MetricsRepository;
use tracing::info;

/// KV key holding the accumulated clean-day decay.
const KV_DECAY: &str = "threshold_decay";
/// KV key holding the IST date the decay was last adjusted for.
const KV_DECAY_DATE: &str = "threshold_decay_date";

/// Mutable per-session state. One instance, owned behind a lock by the
/// engine; the scheduler is the only writer.
#[derive(Debug, Default, Clone)]
pub struct PipelineState {
    pub active_position: Option<ActivePosition>,
    /// What the last cadence told callers (TRADE, HOLD, or WAIT).
    pub last_action: Option<Action>,
    pub daily_realized_pl: f64,
    pub daily_sl_hits: u32,
    pub last_cadence_ts: i64,
    /// IST date (YYYY-MM-DD) the daily counters belong to.
    pub current_day: String,
}

impl PipelineState {
    /// Reset per-day counters when the session date rolls over.
    pub fn roll_day(&mut self, day: &str) {
        if self.current_day != day {
            self.current_day = day.to_string();
            self.daily_realized_pl = 0.0;
            self.daily_sl_hits = 0;
            self.active_position = None;
            self.last_action = None;
        }
    }
}

/// Effective confidence threshold: floor raised 2 points per loss in the
/// last 10 snapshots, less the accumulated clean-day decay, clamped to
/// [floor, ceiling].
pub fn adaptive_threshold(floor: f64, ceiling: f64, losses_in_last_10: u32, decay: u32) -> f64 {
    (floor + 2.0 * losses_in_last_10 as f64 - decay as f64).clamp(floor, ceiling)
}

/// Read the persisted decay counter.
pub fn load_decay(repo: &MetricsRepository) -> u32 {
    repo.kv_get(KV_DECAY)
        .ok()
        .flatten()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Apply the once-per-day decay adjustment: a completed day with snapshots
/// and zero losses earns one decay point; a day with losses resets it.
/// Called lazily at the first evaluation of each new IST day.
pub fn roll_decay_for_day(repo: &MetricsRepository, symbol: &str, today: &str, prev_day_losses: u32, prev_day_snapshots: u32) {
    let last = repo.kv_get(KV_DECAY_DATE).ok().flatten().unwrap_or_default();
    if last == today {
        return;
    }
    let mut decay = load_decay(repo);
    if prev_day_snapshots > 0 {
        if prev_day_losses == 0 {
            decay += 1;
            info!(symbol, decay, "clean day: threshold decay incremented");
        } else {
            decay = 0;
        }
    }
    let _ = repo.kv_set(KV_DECAY, &decay.to_string());
    let _ = repo.kv_set(KV_DECAY_DATE, today);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_raises_with_losses_and_caps() {
        assert_eq!(adaptive_threshold(60.0, 75.0, 0, 0), 60.0);
        assert_eq!(adaptive_threshold(60.0, 75.0, 3, 0), 66.0);
        assert_eq!(adaptive_threshold(60.0, 75.0, 10, 0), 75.0);
    }

    #[test]
    fn decay_lowers_but_not_below_floor() {
        assert_eq!(adaptive_threshold(60.0, 75.0, 2, 1), 63.0);
        assert_eq!(adaptive_threshold(60.0, 75.0, 0, 5), 60.0);
    }

    #[test]
    fn day_roll_clears_counters() {
        let mut state = PipelineState {
            daily_realized_pl: -500.0,
            daily_sl_hits: 2,
            current_day: "2026-07-31".into(),
            ..Default::default()
        };
        state.roll_day("2026-07-31");
        assert_eq!(state.daily_sl_hits, 2);
        state.roll_day("2026-08-01");
        assert_eq!(state.daily_sl_hits, 0);
        assert_eq!(state.daily_realized_pl, 0.0);
        assert!(state.active_position.is_none());
    }

    #[test]
    fn decay_rolls_once_per_day() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        roll_decay_for_day(&repo, "NIFTY", "2026-08-03", 0, 5);
        assert_eq!(load_decay(&repo), 1);
        // Same day again: no double count.
        roll_decay_for_day(&repo, "NIFTY", "2026-08-03", 0, 5);
        assert_eq!(load_decay(&repo), 1);
        // Next day after a lossy day: reset.
        roll_decay_for_day(&repo, "NIFTY", "2026-08-04", 2, 6);
        assert_eq!(load_decay(&repo), 0);
    }
}
