//! Repository schema. This module only defines tables and indices.

use rusqlite::Connection;

/// Create tables and indices if absent. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            ts            INTEGER NOT NULL,
            symbol        TEXT NOT NULL,
            condition     TEXT NOT NULL,
            quality       TEXT NOT NULL,
            direction     TEXT,
            confidence    REAL,
            up_prob       REAL,
            down_prob     REAL,
            entry         REAL,
            target        REAL,
            sl            REAL,
            rr            REAL,
            position_lots INTEGER,
            strike        REAL,
            option_type   TEXT,
            features_blob TEXT NOT NULL,
            filters_blob  TEXT NOT NULL,
            plan_blob     TEXT,
            outcome       TEXT NOT NULL,
            realized_pl   REAL NOT NULL DEFAULT 0,
            resolved_ts   INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_symbol_ts
            ON snapshots(symbol, ts);
        CREATE INDEX IF NOT EXISTS idx_snapshots_outcome
            ON snapshots(outcome);

        CREATE TABLE IF NOT EXISTS market_structure (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            ts         INTEGER NOT NULL,
            symbol     TEXT NOT NULL,
            condition  TEXT NOT NULL,
            support    REAL NOT NULL,
            resistance REAL NOT NULL,
            vwap       REAL NOT NULL,
            cpr_pivot  REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_structure_symbol_ts
            ON market_structure(symbol, ts);

        CREATE TABLE IF NOT EXISTS daily_summary (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            date            TEXT NOT NULL,
            symbol          TEXT NOT NULL,
            quiet_count     INTEGER NOT NULL DEFAULT 0,
            normal_count    INTEGER NOT NULL DEFAULT 0,
            high_count      INTEGER NOT NULL DEFAULT 0,
            extreme_count   INTEGER NOT NULL DEFAULT 0,
            weak_count      INTEGER NOT NULL DEFAULT 0,
            moderate_count  INTEGER NOT NULL DEFAULT 0,
            strong_count    INTEGER NOT NULL DEFAULT 0,
            excellent_count INTEGER NOT NULL DEFAULT 0,
            trade_count     INTEGER NOT NULL DEFAULT 0,
            wait_count      INTEGER NOT NULL DEFAULT 0,
            avg_confidence  REAL NOT NULL DEFAULT 0,
            total_snapshots INTEGER NOT NULL DEFAULT 0,
            UNIQUE(date, symbol)
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // idempotent

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for t in ["snapshots", "market_structure", "daily_summary", "config_kv"] {
            assert!(tables.iter().any(|name| name == t), "missing {t}");
        }
    }
}
