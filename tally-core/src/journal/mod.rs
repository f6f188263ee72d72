use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tally_model::{
    instruments::SymbolNormalizer,
    trade::{RawTrade, Trade},
    validation::{sanitize_batch, RejectedRecord},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    accounting::{
        cost_basis::{CostBasisEngine, LedgerStep},
        recompute::{recompute_all, recompute_symbols, RecomputeSummary},
    },
    model::journal_error::JournalError,
    statistic::{
        currency::{CurrencyListing, CurrencyReport},
        summary::{PortfolioFilter, PortfolioSummary},
    },
};

use self::{
    builder::JournalBuilder,
    repository::{TradeFilter, TradeHandler, WatermarkHandler, LAST_SYNC_KEY},
};

pub mod builder;
pub mod repository;

/// Result of one ingest cycle: validate, merge, then replay the symbols that changed.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub batch_id: Uuid,
    pub total: usize,
    pub inserted: usize,
    pub ignored: usize,
    #[serde(skip)]
    pub rejected: Vec<RejectedRecord>,
    pub recompute: RecomputeSummary,
}

/// Ingestion boundary and read facade over one trade store. Every operation takes the
/// store lock, so an import's validate-insert-recompute cycle never interleaves with
/// another import or a full recompute.
pub struct Journal<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    pub(crate) journal_id: Uuid,
    pub(crate) repository: Arc<Mutex<Repository>>,
    pub(crate) normalizer: SymbolNormalizer,
    pub(crate) engine: CostBasisEngine,
    pub(crate) rejection_threshold: f64,
}

impl<Repository> Clone for Journal<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    fn clone(&self) -> Self {
        Self {
            journal_id: self.journal_id,
            repository: Arc::clone(&self.repository),
            normalizer: self.normalizer.clone(),
            engine: self.engine.clone(),
            rejection_threshold: self.rejection_threshold,
        }
    }
}

impl<Repository> Journal<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    pub fn builder() -> JournalBuilder<Repository> {
        JournalBuilder::new()
    }

    pub fn normalizer(&self) -> &SymbolNormalizer {
        &self.normalizer
    }

    pub fn import(&self, raws: &[RawTrade]) -> Result<ImportReport, JournalError> {
        let batch_id = Uuid::new_v4();
        let mut repository = self.repository.lock();

        let batch = sanitize_batch(raws, &self.normalizer, self.rejection_threshold)?;
        for rejected in &batch.rejected {
            warn!(
                batch_id = %batch_id,
                row = rejected.index + 1,
                field = rejected.error.field(),
                error = %rejected.error,
                "skipped invalid trade record"
            );
        }

        let symbols = batch
            .trades
            .iter()
            .map(|trade| (trade.id.clone(), trade.symbol.clone()))
            .collect::<BTreeMap<_, _>>();
        let outcome = repository.insert_trades(batch.trades)?;

        let touched = outcome
            .inserted_ids
            .iter()
            .filter_map(|id| symbols.get(id))
            .collect::<BTreeSet<_>>();
        let recompute = recompute_symbols(&mut *repository, &self.engine, touched);

        info!(
            journal_id = %self.journal_id,
            batch_id = %batch_id,
            total = raws.len(),
            inserted = outcome.inserted,
            ignored = outcome.ignored,
            rejected = batch.rejected.len(),
            "imported trade batch"
        );

        Ok(ImportReport {
            batch_id,
            total: raws.len(),
            inserted: outcome.inserted,
            ignored: outcome.ignored,
            rejected: batch.rejected,
            recompute,
        })
    }

    pub fn recompute_all(&self) -> Result<RecomputeSummary, JournalError> {
        let mut repository = self.repository.lock();
        Ok(recompute_all(&mut *repository, &self.engine)?)
    }

    pub fn trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, JournalError> {
        let filter = TradeFilter {
            symbol: filter.symbol.as_deref().map(|symbol| self.normalizer.normalize(symbol)),
            ..filter.clone()
        };
        Ok(self.repository.lock().query(&filter)?)
    }

    pub fn symbols(&self) -> Result<Vec<String>, JournalError> {
        Ok(self.repository.lock().all_symbols()?)
    }

    pub fn trade_count(&self) -> Result<usize, JournalError> {
        Ok(self.repository.lock().trade_count()?)
    }

    pub fn currency_report(&self, base_currency: &str) -> Result<CurrencyReport, JournalError> {
        let trades = self.repository.lock().query(&TradeFilter::new())?;
        Ok(CurrencyReport::generate(&trades, base_currency, &self.normalizer)?)
    }

    pub fn portfolio_report(&self, filter: &PortfolioFilter) -> Result<PortfolioSummary, JournalError> {
        let query = filter.resolve(Utc::now().naive_utc(), &self.normalizer);
        let trades = self.repository.lock().query(&query)?;
        Ok(PortfolioSummary::generate(&trades, &self.normalizer)?)
    }

    pub fn list_currencies(&self) -> Result<CurrencyListing, JournalError> {
        let trades = self.repository.lock().query(&TradeFilter::new())?;
        Ok(CurrencyListing::generate(&trades, &self.normalizer)?)
    }

    /// Trade-by-trade replay of every pair whose base is `base_currency`, merged in time
    /// order. Each pair keeps its own running position.
    pub fn currency_ledger(&self, base_currency: &str) -> Result<Vec<LedgerStep>, JournalError> {
        let mut repository = self.repository.lock();
        let symbols = repository
            .all_symbols()?
            .into_iter()
            .filter(|symbol| {
                self.normalizer
                    .base_currency(symbol)
                    .eq_ignore_ascii_case(base_currency.trim())
            })
            .collect::<HashSet<_>>();

        let mut steps = Vec::new();
        for symbol in symbols {
            let trades = repository.query(&TradeFilter::new().symbol(symbol))?;
            steps.extend(self.engine.replay_detailed(&trades)?);
        }
        steps.sort_by(|a, b| {
            a.trade
                .chronological_key()
                .cmp(&b.trade.chronological_key())
                .then_with(|| a.trade.symbol.cmp(&b.trade.symbol))
        });
        Ok(steps)
    }

    pub fn last_sync(&self) -> Result<Option<NaiveDateTime>, JournalError> {
        Ok(self
            .repository
            .lock()
            .get_watermark(LAST_SYNC_KEY)?
            .map(|watermark| watermark.timestamp))
    }

    pub fn record_sync(&self, timestamp: NaiveDateTime) -> Result<(), JournalError> {
        self.repository.lock().set_watermark(LAST_SYNC_KEY, timestamp)?;
        info!(journal_id = %self.journal_id, %timestamp, "recorded sync watermark");
        Ok(())
    }
}
