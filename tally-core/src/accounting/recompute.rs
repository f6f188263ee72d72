use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    journal::repository::{TradeFilter, TradeHandler},
    model::{recompute_error::RecomputeError, repository_error::RepositoryError},
};

use super::cost_basis::CostBasisEngine;

#[derive(Debug, Default, Serialize)]
pub struct RecomputeSummary {
    pub symbols: usize,
    pub trades: usize,
    #[serde(skip)]
    pub failures: Vec<RecomputeError>,
}

impl RecomputeSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Replay one symbol's full history and write its pnl back as a unit.
pub fn recompute_symbol<Repository>(
    repository: &mut Repository,
    engine: &CostBasisEngine,
    symbol: &str,
) -> Result<usize, RecomputeError>
where
    Repository: TradeHandler,
{
    let trades = repository
        .query(&TradeFilter::new().symbol(symbol))
        .map_err(|source| RecomputeError::Load {
            symbol: symbol.to_owned(),
            source,
        })?;

    let replay = engine.replay(&trades).map_err(|source| RecomputeError::Arithmetic {
        symbol: symbol.to_owned(),
        source,
    })?;
    repository
        .set_pnl(symbol, &replay.pnl)
        .map_err(|source| RecomputeError::Store {
            symbol: symbol.to_owned(),
            source,
        })
}

/// Replay only `symbols`, eg/ those touched by the latest ingest. Each symbol is replayed
/// in full so running it twice changes nothing.
pub fn recompute_symbols<Repository, Symbols, S>(
    repository: &mut Repository,
    engine: &CostBasisEngine,
    symbols: Symbols,
) -> RecomputeSummary
where
    Repository: TradeHandler,
    Symbols: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let symbols = symbols
        .into_iter()
        .map(|symbol| symbol.as_ref().to_owned())
        .collect::<BTreeSet<_>>();

    let mut summary = RecomputeSummary::default();
    for symbol in symbols {
        match recompute_symbol(repository, engine, &symbol) {
            Ok(trades) => {
                summary.symbols += 1;
                summary.trades += trades;
            }
            Err(error) => {
                warn!(symbol = %symbol, %error, "failed to recompute symbol pnl, continuing");
                summary.failures.push(error);
            }
        }
    }

    info!(
        symbols = summary.symbols,
        trades = summary.trades,
        failures = summary.failures.len(),
        "recomputed realized pnl"
    );
    summary
}

pub fn recompute_all<Repository>(
    repository: &mut Repository,
    engine: &CostBasisEngine,
) -> Result<RecomputeSummary, RepositoryError>
where
    Repository: TradeHandler,
{
    let symbols = repository.all_symbols()?;
    Ok(recompute_symbols(repository, engine, symbols))
}
