/// SQLite schema shared by the snapshot store and the position store.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS market_snapshots (
///     symbol         TEXT PRIMARY KEY,
///     snapshot_json  TEXT NOT NULL,
///     source         TEXT NOT NULL,
///     updated_at     TEXT NOT NULL,
///     expires_at     TEXT NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS positions (
///     owner        TEXT NOT NULL,
///     symbol       TEXT NOT NULL,
///     label        TEXT NOT NULL,
///     direction    TEXT NOT NULL,
///     value        TEXT NOT NULL,
///     factor       TEXT NOT NULL,
///     barrier      TEXT NOT NULL,
///     performance  TEXT,
///     currency     TEXT NOT NULL,
///     updated_at   TEXT NOT NULL,
///     PRIMARY KEY (owner, symbol)
/// );
/// ```
///
/// Decimal columns are stored as TEXT so amounts round-trip exactly.
pub const CACHE_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS market_snapshots (
    symbol         TEXT PRIMARY KEY,
    snapshot_json  TEXT NOT NULL,
    source         TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    expires_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshot_expires ON market_snapshots(expires_at);
CREATE TABLE IF NOT EXISTS positions (
    owner        TEXT NOT NULL,
    symbol       TEXT NOT NULL,
    label        TEXT NOT NULL,
    direction    TEXT NOT NULL,
    value        TEXT NOT NULL,
    factor       TEXT NOT NULL,
    barrier      TEXT NOT NULL,
    performance  TEXT,
    currency     TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    PRIMARY KEY (owner, symbol)
);
";

/// Key conventions for the in-memory hot cache.
pub mod key_patterns {
    pub fn snapshot(symbol: &str) -> String {
        format!("snapshot:{symbol}")
    }
}

/// A raw snapshot row as read from SQLite.
#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub symbol: String,
    pub snapshot_json: String,
    pub source: String,
    pub updated_at: String,
    pub expires_at: String,
}
