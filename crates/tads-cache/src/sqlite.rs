use std::str::FromStr;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use tads_models::cache_schema::{SnapshotRow, CACHE_TABLE_DDL};
use tads_models::{Currency, MarketSnapshot, Position, PositionDirection};

use crate::error::CacheError;

/// SQLite accessor for market snapshots and persisted positions.
///
/// Snapshots carry an expiry and are written by whatever market-data feed
/// the deployment uses. Positions are owned by this system and keyed by
/// `(owner, symbol)`.
pub struct SqliteStore {
    conn: Connection,
}

struct RawPosition {
    symbol: String,
    label: String,
    direction: String,
    value: String,
    factor: String,
    barrier: String,
    performance: Option<String>,
    currency: String,
}

fn decimal(symbol: &str, column: &str, raw: &str) -> Result<Decimal, CacheError> {
    Decimal::from_str(raw).map_err(|e| CacheError::Corrupt {
        key: symbol.to_string(),
        reason: format!("{column}={raw}: {e}"),
    })
}

impl RawPosition {
    fn into_position(self) -> Result<Position, CacheError> {
        let corrupt = |reason: String| CacheError::Corrupt {
            key: self.symbol.clone(),
            reason,
        };
        let direction = PositionDirection::from_str(&self.direction)
            .map_err(|e| corrupt(e.to_string()))?;
        let currency = Currency::from_str(&self.currency).map_err(corrupt)?;
        let performance = match &self.performance {
            Some(raw) => Some(decimal(&self.symbol, "performance", raw)?),
            None => None,
        };

        Ok(Position {
            value: decimal(&self.symbol, "value", &self.value)?,
            factor: decimal(&self.symbol, "factor", &self.factor)?,
            barrier: decimal(&self.symbol, "barrier", &self.barrier)?,
            symbol: self.symbol,
            label: self.label,
            direction,
            performance,
            currency,
        })
    }
}

impl SqliteStore {
    /// Open (creating if needed) the database file and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database with the schema created. Useful for testing.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CACHE_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Get the snapshot row for a symbol. Returns None if missing or expired.
    pub fn get_snapshot(&self, symbol: &str) -> Result<Option<SnapshotRow>, CacheError> {
        let now = Utc::now().to_rfc3339();
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, snapshot_json, source, updated_at, expires_at \
             FROM market_snapshots WHERE symbol = ?1 AND expires_at > ?2",
        )?;

        let row = stmt
            .query_row(params![symbol, now], |row| {
                Ok(SnapshotRow {
                    symbol: row.get(0)?,
                    snapshot_json: row.get(1)?,
                    source: row.get(2)?,
                    updated_at: row.get(3)?,
                    expires_at: row.get(4)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Write a snapshot that stays valid for `ttl`.
    pub fn put_snapshot(
        &self,
        snapshot: &MarketSnapshot,
        source: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT OR REPLACE INTO market_snapshots \
             (symbol, snapshot_json, source, updated_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.symbol,
                serde_json::to_string(snapshot)?,
                source,
                now.to_rfc3339(),
                (now + ttl).to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a position for `owner`.
    pub fn upsert_position(&self, owner: &str, position: &Position) -> Result<(), CacheError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO positions \
             (owner, symbol, label, direction, value, factor, barrier, performance, currency, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                owner,
                position.symbol,
                position.label,
                position.direction.as_str(),
                position.value.to_string(),
                position.factor.to_string(),
                position.barrier.to_string(),
                position.performance.map(|p| p.to_string()),
                position.currency.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All positions for `owner`, least recently written first.
    pub fn list_positions(&self, owner: &str) -> Result<Vec<Position>, CacheError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, label, direction, value, factor, barrier, performance, currency \
             FROM positions WHERE owner = ?1 ORDER BY rowid",
        )?;

        let raw = stmt
            .query_map(params![owner], |row| {
                Ok(RawPosition {
                    symbol: row.get(0)?,
                    label: row.get(1)?,
                    direction: row.get(2)?,
                    value: row.get(3)?,
                    factor: row.get(4)?,
                    barrier: row.get(5)?,
                    performance: row.get(6)?,
                    currency: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter().map(RawPosition::into_position).collect()
    }

    /// Remove one position. Returns whether a row was deleted.
    pub fn remove_position(&self, owner: &str, symbol: &str) -> Result<bool, CacheError> {
        let removed = self.conn.execute(
            "DELETE FROM positions WHERE owner = ?1 AND symbol = ?2",
            params![owner, symbol],
        )?;
        Ok(removed > 0)
    }

    /// Remove every position of `owner`. Returns the number of rows deleted.
    pub fn clear_positions(&self, owner: &str) -> Result<usize, CacheError> {
        let removed = self
            .conn
            .execute("DELETE FROM positions WHERE owner = ?1", params![owner])?;
        Ok(removed)
    }
}
