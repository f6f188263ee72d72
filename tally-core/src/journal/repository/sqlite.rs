use std::{path::Path, str::FromStr};

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use rust_decimal::Decimal;
use tally_model::{
    deserialization::{parse_timestamp, TIMESTAMP_FORMAT},
    enums::Side,
    identifiers::{DataSource, TradeId},
    trade::Trade,
};
use tracing::{debug, info};

use crate::{accounting::cost_basis::PnlMap, model::repository_error::RepositoryError};

use super::{InsertOutcome, TradeFilter, TradeHandler, Watermark, WatermarkHandler};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS trades (
    id TEXT PRIMARY KEY,
    sequence INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    symbol TEXT NOT NULL,
    original_symbol TEXT,
    original_quote_currency TEXT,
    side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
    price TEXT NOT NULL,
    quantity TEXT NOT NULL,
    quote_quantity TEXT NOT NULL,
    fee TEXT NOT NULL,
    fee_currency TEXT NOT NULL,
    pnl TEXT,
    data_source TEXT NOT NULL DEFAULT 'spreadsheet'
);

CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol);
CREATE INDEX IF NOT EXISTS idx_trades_timestamp ON trades(timestamp);
CREATE INDEX IF NOT EXISTS idx_trades_side ON trades(side);

CREATE TABLE IF NOT EXISTS sync_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT
);
"#;

const TRADE_COLUMNS: &str = "id, sequence, timestamp, symbol, original_symbol, original_quote_currency, \
     side, price, quantity, quote_quantity, fee, fee_currency, pnl, data_source";

const INSERT_TRADE_SQL: &str = "INSERT OR IGNORE INTO trades (id, sequence, timestamp, symbol, \
     original_symbol, original_quote_currency, side, price, quantity, quote_quantity, fee, \
     fee_currency, pnl, data_source) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Durable trade store on a single SQLite file. Decimals are kept as text so no precision
/// is lost to floating point.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    /// Open or create the database at `path`, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        if let Some(parent) = path.as_ref().parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let repository = Self {
            conn: Connection::open(path.as_ref())?,
        };
        repository.init_schema()?;
        info!(path = %path.as_ref().display(), "opened sqlite trade repository");
        Ok(repository)
    }

    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        let repository = Self {
            conn: Connection::open_in_memory()?,
        };
        repository.init_schema()?;
        Ok(repository)
    }

    fn init_schema(&self) -> Result<(), RepositoryError> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }
}

impl TradeHandler for SqliteRepository {
    fn insert_trade(&mut self, trade: Trade) -> Result<bool, RepositoryError> {
        let outcome = self.insert_trades(vec![trade])?;
        Ok(outcome.inserted == 1)
    }

    fn insert_trades(&mut self, trades: Vec<Trade>) -> Result<InsertOutcome, RepositoryError> {
        let tx = self.conn.transaction()?;
        let mut outcome = InsertOutcome::default();
        {
            let mut sequence: i64 =
                tx.query_row("SELECT COALESCE(MAX(sequence), 0) FROM trades", [], |row| row.get(0))?;
            let mut statement = tx.prepare(INSERT_TRADE_SQL)?;

            for trade in trades {
                let changed = statement.execute(params![
                    trade.id.as_ref(),
                    sequence + 1,
                    trade.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    trade.symbol,
                    trade.original_symbol,
                    trade.original_quote_currency,
                    trade.side.as_str(),
                    trade.price.to_string(),
                    trade.quantity.to_string(),
                    trade.quote_quantity.to_string(),
                    trade.fee.to_string(),
                    trade.fee_currency,
                    trade.pnl.map(|pnl| pnl.to_string()),
                    trade.data_source.as_str(),
                ])?;

                if changed > 0 {
                    sequence += 1;
                }
                outcome.record(trade.id, changed > 0);
            }
        }
        tx.commit()?;

        debug!(inserted = outcome.inserted, ignored = outcome.ignored, "sqlite batch committed");
        Ok(outcome)
    }

    fn query(&mut self, filter: &TradeFilter) -> Result<Vec<Trade>, RepositoryError> {
        let mut sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE 1=1");
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            values.push(Box::new(since.format(TIMESTAMP_FORMAT).to_string()));
        }
        if let Some(symbol) = &filter.symbol {
            sql.push_str(" AND symbol = ?");
            values.push(Box::new(symbol.clone()));
        }
        if let Some(side) = filter.side {
            sql.push_str(" AND side = ?");
            values.push(Box::new(side.as_str()));
        }
        sql.push_str(" ORDER BY timestamp ASC, sequence ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement
            .query_map(params_from_iter(values.iter()), StoredTrade::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Trade::try_from).collect()
    }

    fn all_symbols(&mut self) -> Result<Vec<String>, RepositoryError> {
        let mut statement = self.conn.prepare("SELECT DISTINCT symbol FROM trades ORDER BY symbol")?;
        let symbols = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    fn trade_count(&mut self) -> Result<usize, RepositoryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn set_pnl(&mut self, symbol: &str, pnl: &PnlMap) -> Result<usize, RepositoryError> {
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut statement = tx.prepare("UPDATE trades SET pnl = ?1 WHERE id = ?2 AND symbol = ?3")?;
            for (id, value) in pnl {
                updated += statement.execute(params![value.to_string(), id.as_ref(), symbol])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }
}

impl WatermarkHandler for SqliteRepository {
    fn get_watermark(&mut self, key: &str) -> Result<Option<Watermark>, RepositoryError> {
        let stored = self
            .conn
            .query_row(
                "SELECT value, updated_at FROM sync_metadata WHERE key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        stored
            .map(|(value, updated_at)| -> Result<Watermark, RepositoryError> {
                let timestamp = decode_timestamp("value", &value)?;
                let updated_at = match updated_at {
                    Some(updated_at) => decode_timestamp("updated_at", &updated_at)?,
                    None => timestamp,
                };
                Ok(Watermark {
                    key: key.to_owned(),
                    timestamp,
                    updated_at,
                })
            })
            .transpose()
    }

    fn set_watermark(&mut self, key: &str, timestamp: NaiveDateTime) -> Result<(), RepositoryError> {
        self.conn.execute(
            "INSERT INTO sync_metadata (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![
                key,
                timestamp.format(TIMESTAMP_FORMAT).to_string(),
                Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }
}

/// Row of `trades` exactly as stored, before decoding.
struct StoredTrade {
    id: String,
    sequence: i64,
    timestamp: String,
    symbol: String,
    original_symbol: Option<String>,
    original_quote_currency: Option<String>,
    side: String,
    price: String,
    quantity: String,
    quote_quantity: String,
    fee: String,
    fee_currency: String,
    pnl: Option<String>,
    data_source: String,
}

impl StoredTrade {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sequence: row.get(1)?,
            timestamp: row.get(2)?,
            symbol: row.get(3)?,
            original_symbol: row.get(4)?,
            original_quote_currency: row.get(5)?,
            side: row.get(6)?,
            price: row.get(7)?,
            quantity: row.get(8)?,
            quote_quantity: row.get(9)?,
            fee: row.get(10)?,
            fee_currency: row.get(11)?,
            pnl: row.get(12)?,
            data_source: row.get(13)?,
        })
    }
}

impl TryFrom<StoredTrade> for Trade {
    type Error = RepositoryError;

    fn try_from(stored: StoredTrade) -> Result<Self, Self::Error> {
        let side = Side::from_str(&stored.side).map_err(|_| RepositoryError::Decode {
            column: "side",
            value: stored.side.clone(),
        })?;

        Ok(Trade {
            id: TradeId::from(stored.id),
            timestamp: decode_timestamp("timestamp", &stored.timestamp)?,
            original_symbol: stored.original_symbol.unwrap_or_else(|| stored.symbol.clone()),
            original_quote_currency: stored.original_quote_currency.unwrap_or_default(),
            symbol: stored.symbol,
            side,
            price: decode_decimal("price", &stored.price)?,
            quantity: decode_decimal("quantity", &stored.quantity)?,
            quote_quantity: decode_decimal("quote_quantity", &stored.quote_quantity)?,
            fee: decode_decimal("fee", &stored.fee)?,
            fee_currency: stored.fee_currency,
            pnl: stored
                .pnl
                .as_deref()
                .map(|pnl| decode_decimal("pnl", pnl))
                .transpose()?,
            data_source: DataSource::from(stored.data_source),
            sequence: stored.sequence.max(0) as u64,
        })
    }
}

fn decode_decimal(column: &'static str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|_| RepositoryError::Decode {
        column,
        value: value.to_owned(),
    })
}

fn decode_timestamp(column: &'static str, value: &str) -> Result<NaiveDateTime, RepositoryError> {
    parse_timestamp(value).ok_or_else(|| RepositoryError::Decode {
        column,
        value: value.to_owned(),
    })
}
