use std::sync::Arc;

use parking_lot::Mutex;
use tally_model::{instruments::SymbolNormalizer, validation::DEFAULT_REJECTION_THRESHOLD};
use uuid::Uuid;

use crate::{accounting::cost_basis::CostBasisEngine, model::journal_error::JournalError};

use super::{
    repository::{TradeHandler, WatermarkHandler},
    Journal,
};

pub struct JournalBuilder<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    repository: Option<Repository>,
    normalizer: Option<SymbolNormalizer>,
    rejection_threshold: Option<f64>,
}

impl<Repository> JournalBuilder<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    pub fn new() -> Self {
        Self {
            repository: None,
            normalizer: None,
            rejection_threshold: None,
        }
    }

    pub fn repository(self, value: Repository) -> Self {
        Self {
            repository: Some(value),
            ..self
        }
    }

    pub fn normalizer(self, value: SymbolNormalizer) -> Self {
        Self {
            normalizer: Some(value),
            ..self
        }
    }

    pub fn rejection_threshold(self, value: f64) -> Self {
        Self {
            rejection_threshold: Some(value),
            ..self
        }
    }

    pub fn build(self) -> Result<Journal<Repository>, JournalError> {
        let normalizer = self
            .normalizer
            .ok_or(JournalError::BuilderIncomplete("normalizer"))?;

        Ok(Journal {
            journal_id: Uuid::new_v4(),
            repository: Arc::new(Mutex::new(
                self.repository
                    .ok_or(JournalError::BuilderIncomplete("repository"))?,
            )),
            engine: CostBasisEngine::new(normalizer.clone()),
            normalizer,
            rejection_threshold: self
                .rejection_threshold
                .unwrap_or(DEFAULT_REJECTION_THRESHOLD),
        })
    }
}

impl<Repository> Default for JournalBuilder<Repository>
where
    Repository: TradeHandler + WatermarkHandler,
{
    fn default() -> Self {
        Self::new()
    }
}
