//! # Drishti Store
//!
//! Durable, append-mostly repository of cadence snapshots with secondary
//! indices by `(symbol, ts)` and by outcome, a market-structure log, a daily
//! summary, and a small config KV used for adaptive-threshold state.
//!
//! Writes come from a single pipeline task; reads may be concurrent. Each
//! `put` is one transaction, so readers never observe a partial snapshot.

pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::info;

use drishti_models::{
    Direction, EngineError, FeatureVector, FilterResult, MarketCondition, Outcome, Prediction,
    SetupQuality, Snapshot, TradePlan,
};

/// Aggregate performance over a trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoStats {
    pub window_days: u32,
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    /// Wins over resolved trades, in [0, 1]. 0 when nothing resolved.
    pub win_rate: f64,
    pub total_pl: f64,
    /// Mean seconds from emission to target for winning snapshots.
    pub avg_win_duration_secs: f64,
    /// IST hour with the most wins; None when there are no wins.
    pub best_hour: Option<u32>,
}

/// IST offset applied when bucketing UTC timestamps into session hours.
const IST_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

fn ist_hour(ts_utc: i64) -> u32 {
    (((ts_utc + IST_OFFSET_SECS).rem_euclid(86_400)) / 3_600) as u32
}

fn repo_err(e: rusqlite::Error) -> EngineError {
    EngineError::Repository(e.to_string())
}

/// SQLite-backed metrics repository.
pub struct MetricsRepository {
    conn: Mutex<Connection>,
}

impl MetricsRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(path.as_ref()).map_err(repo_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(repo_err)?;
        schema::init_schema(&conn).map_err(repo_err)?;
        info!(path = %path.as_ref().display(), "metrics repository opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(repo_err)?;
        schema::init_schema(&conn).map_err(repo_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist one snapshot atomically. Returns the assigned row id.
    pub fn put(&self, snap: &Snapshot) -> Result<i64, EngineError> {
        let conn = self.conn.lock().expect("repository lock");

        let features_blob = snap.features.to_json().to_string();
        let filters_blob = serde_json::to_string(&snap.filter_results)
            .map_err(|e| EngineError::Repository(e.to_string()))?;
        let plan_blob = match &snap.plan {
            Some(plan) => Some(
                serde_json::to_string(plan).map_err(|e| EngineError::Repository(e.to_string()))?,
            ),
            None => None,
        };

        conn.execute(
            "INSERT INTO snapshots (
                ts, symbol, condition, quality,
                direction, confidence, up_prob, down_prob,
                entry, target, sl, rr, position_lots, strike, option_type,
                features_blob, filters_blob, plan_blob, outcome, realized_pl
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20)",
            params![
                snap.timestamp,
                snap.symbol,
                snap.condition.as_str(),
                snap.quality.as_str(),
                snap.prediction.map(|p| p.direction.as_str()),
                snap.prediction.map(|p| p.confidence),
                snap.prediction.map(|p| p.up_prob),
                snap.prediction.map(|p| p.down_prob),
                snap.plan.as_ref().map(|p| p.entry),
                snap.plan.as_ref().map(|p| p.target),
                snap.plan.as_ref().map(|p| p.stoploss),
                snap.plan.as_ref().map(|p| p.risk_reward),
                snap.plan.as_ref().map(|p| p.position_size_lots),
                snap.plan.as_ref().map(|p| p.strike),
                snap.plan.as_ref().map(|p| p.option_type.as_str()),
                features_blob,
                filters_blob,
                plan_blob,
                snap.outcome.as_str(),
                snap.realized_pl,
            ],
        )
        .map_err(repo_err)?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent `n` snapshots for a symbol, newest first.
    pub fn recent(&self, symbol: &str, n: usize) -> Result<Vec<Snapshot>, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        let mut stmt = conn
            .prepare(
                "SELECT id, ts, symbol, condition, quality,
                        direction, confidence, up_prob, down_prob,
                        features_blob, filters_blob, plan_blob, outcome, realized_pl
                 FROM snapshots
                 WHERE symbol = ?1
                 ORDER BY ts DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(repo_err)?;

        let rows = stmt
            .query_map(params![symbol, n as i64], row_to_snapshot)
            .map_err(repo_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(repo_err)?;
        Ok(rows)
    }

    /// Resolve a pending snapshot. Returns false when the row was already
    /// final, which makes outcome emission at-most-once.
    pub fn update_outcome(
        &self,
        id: i64,
        outcome: Outcome,
        realized_pl: f64,
        resolved_ts: i64,
    ) -> Result<bool, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        let changed = conn
            .execute(
                "UPDATE snapshots
                 SET outcome = ?2, realized_pl = ?3, resolved_ts = ?4
                 WHERE id = ?1 AND outcome = 'PENDING'",
                params![id, outcome.as_str(), realized_pl, resolved_ts],
            )
            .map_err(repo_err)?;
        Ok(changed == 1)
    }

    /// Count of LOSS outcomes among the last `n` snapshots for a symbol.
    pub fn losses_in_recent(&self, symbol: &str, n: usize) -> Result<u32, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT outcome FROM snapshots
                WHERE symbol = ?1 ORDER BY ts DESC, id DESC LIMIT ?2
             ) WHERE outcome = 'LOSS'",
            params![symbol, n as i64],
            |row| row.get::<_, u32>(0),
        )
        .map_err(repo_err)
    }

    /// Total snapshots for a symbol at or after `since_ts` (UTC).
    pub fn count_since(&self, symbol: &str, since_ts: i64) -> Result<u32, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE symbol = ?1 AND ts >= ?2",
            params![symbol, since_ts],
            |row| row.get::<_, u32>(0),
        )
        .map_err(repo_err)
    }

    /// Stop-loss hits recorded for a symbol since `since_ts` (UTC).
    pub fn sl_hits_since(&self, symbol: &str, since_ts: i64) -> Result<u32, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.query_row(
            "SELECT COUNT(*) FROM snapshots
             WHERE symbol = ?1 AND ts >= ?2 AND outcome = 'LOSS'",
            params![symbol, since_ts],
            |row| row.get::<_, u32>(0),
        )
        .map_err(repo_err)
    }

    /// Realized P&L summed over snapshots at or after `since_ts`.
    pub fn realized_pl_since(&self, symbol: &str, since_ts: i64) -> Result<f64, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.query_row(
            "SELECT COALESCE(SUM(realized_pl), 0) FROM snapshots
             WHERE symbol = ?1 AND ts >= ?2",
            params![symbol, since_ts],
            |row| row.get::<_, f64>(0),
        )
        .map_err(repo_err)
    }

    /// Aggregate stats over the trailing `window_days`, all symbols.
    pub fn stats(&self, window_days: u32, now_ts: i64) -> Result<RepoStats, EngineError> {
        let cutoff = now_ts - window_days as i64 * 86_400;
        let conn = self.conn.lock().expect("repository lock");

        let (total, wins, losses, total_pl): (u32, u32, u32, f64) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(outcome = 'WIN'), 0),
                        COALESCE(SUM(outcome = 'LOSS'), 0),
                        COALESCE(SUM(realized_pl), 0)
                 FROM snapshots WHERE ts >= ?1",
                params![cutoff],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(repo_err)?;

        let avg_win_duration_secs: f64 = conn
            .query_row(
                "SELECT COALESCE(AVG(resolved_ts - ts), 0)
                 FROM snapshots
                 WHERE ts >= ?1 AND outcome = 'WIN' AND resolved_ts IS NOT NULL",
                params![cutoff],
                |row| row.get(0),
            )
            .map_err(repo_err)?;

        let mut stmt = conn
            .prepare("SELECT ts FROM snapshots WHERE ts >= ?1 AND outcome = 'WIN'")
            .map_err(repo_err)?;
        let mut hour_counts = [0u32; 24];
        let win_ts = stmt
            .query_map(params![cutoff], |row| row.get::<_, i64>(0))
            .map_err(repo_err)?;
        for ts in win_ts {
            hour_counts[ist_hour(ts.map_err(repo_err)?) as usize] += 1;
        }
        let best_hour = hour_counts
            .iter()
            .enumerate()
            .filter(|(_, c)| **c > 0)
            .max_by_key(|(_, c)| **c)
            .map(|(h, _)| h as u32);

        let resolved = wins + losses;
        Ok(RepoStats {
            window_days,
            total,
            wins,
            losses,
            win_rate: if resolved > 0 {
                wins as f64 / resolved as f64
            } else {
                0.0
            },
            total_pl,
            avg_win_duration_secs,
            best_hour,
        })
    }

    /// Retention enforcement: delete snapshots and structure rows older than
    /// `older_than_days`. Returns the number of snapshots removed.
    pub fn purge(&self, older_than_days: u32, now_ts: i64) -> Result<usize, EngineError> {
        let cutoff = now_ts - older_than_days as i64 * 86_400;
        let conn = self.conn.lock().expect("repository lock");
        let removed = conn
            .execute("DELETE FROM snapshots WHERE ts < ?1", params![cutoff])
            .map_err(repo_err)?;
        conn.execute("DELETE FROM market_structure WHERE ts < ?1", params![cutoff])
            .map_err(repo_err)?;
        if removed > 0 {
            info!(removed, older_than_days, "purged expired snapshots");
        }
        Ok(removed)
    }

    /// Append a market-structure row alongside a snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn put_structure(
        &self,
        ts: i64,
        symbol: &str,
        condition: MarketCondition,
        support: f64,
        resistance: f64,
        vwap: f64,
        cpr_pivot: f64,
    ) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.execute(
            "INSERT INTO market_structure (ts, symbol, condition, support, resistance, vwap, cpr_pivot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![ts, symbol, condition.as_str(), support, resistance, vwap, cpr_pivot],
        )
        .map_err(repo_err)?;
        Ok(())
    }

    /// Recompute the daily summary for `(date, symbol)` from snapshots.
    pub fn update_daily_summary(&self, symbol: &str, date: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.execute(
            "INSERT OR REPLACE INTO daily_summary (
                date, symbol,
                quiet_count, normal_count, high_count, extreme_count,
                weak_count, moderate_count, strong_count, excellent_count,
                trade_count, wait_count, avg_confidence, total_snapshots
             )
             SELECT ?2, ?1,
                    COALESCE(SUM(condition = 'QUIET'), 0),
                    COALESCE(SUM(condition = 'NORMAL'), 0),
                    COALESCE(SUM(condition = 'HIGH'), 0),
                    COALESCE(SUM(condition = 'EXTREME'), 0),
                    COALESCE(SUM(quality = 'WEAK'), 0),
                    COALESCE(SUM(quality = 'MODERATE'), 0),
                    COALESCE(SUM(quality = 'STRONG'), 0),
                    COALESCE(SUM(quality = 'EXCELLENT'), 0),
                    COALESCE(SUM(outcome != 'WAIT'), 0),
                    COALESCE(SUM(outcome = 'WAIT'), 0),
                    COALESCE(AVG(confidence), 0),
                    COUNT(*)
             FROM snapshots
             WHERE symbol = ?1
               AND date(ts + 19800, 'unixepoch') = ?2",
            params![symbol, date],
        )
        .map_err(repo_err)?;
        Ok(())
    }

    /// Read a config value (adaptive-threshold state lives here).
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.query_row(
            "SELECT value FROM config_kv WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(repo_err)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), EngineError> {
        let conn = self.conn.lock().expect("repository lock");
        conn.execute(
            "INSERT OR REPLACE INTO config_kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(repo_err)?;
        Ok(())
    }
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let condition: String = row.get(3)?;
    let quality: String = row.get(4)?;
    let direction: Option<String> = row.get(5)?;
    let features_blob: String = row.get(9)?;
    let filters_blob: String = row.get(10)?;
    let plan_blob: Option<String> = row.get(11)?;
    let outcome: String = row.get(12)?;

    let prediction = match direction.as_deref().and_then(Direction::parse) {
        Some(dir) => Some(Prediction {
            direction: dir,
            confidence: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
            up_prob: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
            down_prob: row.get::<_, Option<f64>>(8)?.unwrap_or(0.0),
        }),
        None => None,
    };

    let features = serde_json::from_str::<Value>(&features_blob)
        .map(|v| FeatureVector::from_json(&v))
        .unwrap_or_default();
    let filter_results: Vec<FilterResult> =
        serde_json::from_str(&filters_blob).unwrap_or_default();
    let plan: Option<TradePlan> =
        plan_blob.and_then(|blob| serde_json::from_str::<TradePlan>(&blob).ok());

    Ok(Snapshot {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        symbol: row.get(2)?,
        features,
        condition: MarketCondition::parse(&condition).unwrap_or(MarketCondition::Normal),
        quality: SetupQuality::parse(&quality).unwrap_or(SetupQuality::Weak),
        prediction,
        plan,
        filter_results,
        outcome: Outcome::parse(&outcome).unwrap_or(Outcome::Wait),
        realized_pl: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_models::{idx, FilterStatus, OptionType};
    use std::collections::BTreeMap;

    fn sample_plan() -> TradePlan {
        TradePlan {
            symbol: "NIFTY".into(),
            direction: Direction::Buy,
            entry: 24_000.0,
            target: 24_040.0,
            target2: 24_070.0,
            stoploss: 23_986.0,
            risk_reward: 2.86,
            position_size_lots: 1,
            strike: 24_000.0,
            option_type: OptionType::Ce,
            premium_entry: 95.0,
            premium_target: 115.0,
            premium_sl: 88.0,
            projected_pl: 1_300.0,
            filters_status: BTreeMap::new(),
            rationale: "trend continuation".into(),
        }
    }

    fn sample_snapshot(ts: i64, outcome: Outcome) -> Snapshot {
        let mut features = FeatureVector::default();
        features.set(idx::ATR_14, 17.0);
        features.set(idx::RSI_14, 58.0);
        Snapshot {
            id: 0,
            timestamp: ts,
            symbol: "NIFTY".into(),
            features,
            condition: MarketCondition::Normal,
            quality: SetupQuality::Strong,
            prediction: Some(Prediction {
                direction: Direction::Buy,
                confidence: 71.0,
                up_prob: 0.71,
                down_prob: 0.29,
            }),
            plan: Some(sample_plan()),
            filter_results: vec![FilterResult::new(
                "position_sizing",
                FilterStatus::Pass,
                "within caps",
            )],
            outcome,
            realized_pl: 0.0,
        }
    }

    #[test]
    fn put_then_recent_round_trips() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        let snap = sample_snapshot(1_000_000, Outcome::Pending);
        let id = repo.put(&snap).unwrap();
        assert!(id > 0);

        let got = repo.recent("NIFTY", 1).unwrap();
        assert_eq!(got.len(), 1);
        let mut expected = snap;
        expected.id = id;
        assert_eq!(got[0], expected);
    }

    #[test]
    fn update_outcome_is_at_most_once() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        let id = repo.put(&sample_snapshot(1_000, Outcome::Pending)).unwrap();

        assert!(repo.update_outcome(id, Outcome::Win, 650.0, 2_000).unwrap());
        assert!(!repo.update_outcome(id, Outcome::Loss, -900.0, 3_000).unwrap());

        let got = repo.recent("NIFTY", 1).unwrap();
        assert_eq!(got[0].outcome, Outcome::Win);
        assert_eq!(got[0].realized_pl, 650.0);
    }

    #[test]
    fn losses_counted_over_recent_window() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        for i in 0..12 {
            let outcome = if i % 4 == 0 { Outcome::Loss } else { Outcome::Win };
            repo.put(&sample_snapshot(1_000 + i, outcome)).unwrap();
        }
        // Last 10 rows are ts 1_002..1_011, containing losses at 1_004, 1_008.
        assert_eq!(repo.losses_in_recent("NIFTY", 10).unwrap(), 2);
    }

    #[test]
    fn stats_aggregates_window() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        let now = 10 * 86_400;

        let mut win = sample_snapshot(now - 3_600, Outcome::Win);
        win.realized_pl = 1_300.0;
        repo.put(&win).unwrap();
        let id = repo.put(&sample_snapshot(now - 1_800, Outcome::Pending)).unwrap();
        repo.update_outcome(id, Outcome::Loss, -900.0, now - 600).unwrap();
        repo.put(&sample_snapshot(now - 40 * 86_400, Outcome::Win)).unwrap();

        let stats = repo.stats(30, now).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 1);
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
        assert!((stats.total_pl - 400.0).abs() < 1e-9);
        assert!(stats.best_hour.is_some());
    }

    #[test]
    fn purge_enforces_retention() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        let now = 100 * 86_400;
        repo.put(&sample_snapshot(now - 40 * 86_400, Outcome::Win)).unwrap();
        repo.put(&sample_snapshot(now - 3_600, Outcome::Win)).unwrap();

        let removed = repo.purge(30, now).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.recent("NIFTY", 10).unwrap().len(), 1);
    }

    #[test]
    fn kv_round_trip() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        assert_eq!(repo.kv_get("adaptive_threshold").unwrap(), None);
        repo.kv_set("adaptive_threshold", "66").unwrap();
        assert_eq!(
            repo.kv_get("adaptive_threshold").unwrap().as_deref(),
            Some("66")
        );
        repo.kv_set("adaptive_threshold", "64").unwrap();
        assert_eq!(
            repo.kv_get("adaptive_threshold").unwrap().as_deref(),
            Some("64")
        );
    }

    #[test]
    fn daily_summary_counts_conditions() {
        let repo = MetricsRepository::open_in_memory().unwrap();
        // 2024-06-03 10:00 IST == 04:30 UTC
        let ts = 19_877 * 86_400 + 4 * 3_600 + 1_800;
        repo.put(&sample_snapshot(ts, Outcome::Win)).unwrap();
        repo.put(&sample_snapshot(ts + 900, Outcome::Wait)).unwrap();
        repo.update_daily_summary("NIFTY", "2024-06-03").unwrap();

        let conn = repo.conn.lock().unwrap();
        let (normal, trades, waits, total): (u32, u32, u32, u32) = conn
            .query_row(
                "SELECT normal_count, trade_count, wait_count, total_snapshots
                 FROM daily_summary WHERE date = '2024-06-03' AND symbol = 'NIFTY'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap();
        assert_eq!(normal, 2);
        assert_eq!(trades, 1);
        assert_eq!(waits, 1);
        assert_eq!(total, 2);
    }

    #[test]
    fn on_disk_repository_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        {
            let repo = MetricsRepository::open(&path).unwrap();
            repo.put(&sample_snapshot(5_000, Outcome::Win)).unwrap();
        }
        let repo = MetricsRepository::open(&path).unwrap();
        assert_eq!(repo.recent("NIFTY", 5).unwrap().len(), 1);
    }
}
