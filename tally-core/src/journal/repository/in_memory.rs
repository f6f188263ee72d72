use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDateTime, Utc};
use tally_model::{identifiers::TradeId, trade::Trade};

use crate::{accounting::cost_basis::PnlMap, model::repository_error::RepositoryError};

use super::{InsertOutcome, TradeFilter, TradeHandler, Watermark, WatermarkHandler};

/// Volatile store keyed by fingerprint, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    trades: HashMap<TradeId, Trade>,
    watermarks: HashMap<String, Watermark>,
    last_sequence: u64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeHandler for InMemoryRepository {
    fn insert_trade(&mut self, mut trade: Trade) -> Result<bool, RepositoryError> {
        if self.trades.contains_key(&trade.id) {
            return Ok(false);
        }

        self.last_sequence += 1;
        trade.sequence = self.last_sequence;
        self.trades.insert(trade.id.clone(), trade);
        Ok(true)
    }

    fn insert_trades(&mut self, trades: Vec<Trade>) -> Result<InsertOutcome, RepositoryError> {
        let mut outcome = InsertOutcome::default();
        for trade in trades {
            let id = trade.id.clone();
            let inserted = self.insert_trade(trade)?;
            outcome.record(id, inserted);
        }
        Ok(outcome)
    }

    fn query(&mut self, filter: &TradeFilter) -> Result<Vec<Trade>, RepositoryError> {
        let mut trades = self
            .trades
            .values()
            .filter(|trade| filter.matches(trade))
            .cloned()
            .collect::<Vec<_>>();

        tally_model::trade::sort_chronologically(&mut trades);
        if let Some(limit) = filter.limit {
            trades.truncate(limit);
        }
        Ok(trades)
    }

    fn all_symbols(&mut self) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .trades
            .values()
            .map(|trade| trade.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    fn trade_count(&mut self) -> Result<usize, RepositoryError> {
        Ok(self.trades.len())
    }

    fn set_pnl(&mut self, symbol: &str, pnl: &PnlMap) -> Result<usize, RepositoryError> {
        let mut updated = 0;
        for trade in self.trades.values_mut().filter(|trade| trade.symbol == symbol) {
            if let Some(value) = pnl.get(&trade.id) {
                trade.pnl = Some(*value);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

impl WatermarkHandler for InMemoryRepository {
    fn get_watermark(&mut self, key: &str) -> Result<Option<Watermark>, RepositoryError> {
        Ok(self.watermarks.get(key).cloned())
    }

    fn set_watermark(&mut self, key: &str, timestamp: NaiveDateTime) -> Result<(), RepositoryError> {
        self.watermarks.insert(
            key.to_owned(),
            Watermark {
                key: key.to_owned(),
                timestamp,
                updated_at: Utc::now().naive_utc(),
            },
        );
        Ok(())
    }
}
