use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    deserialization,
    enums::Side,
    identifiers::{DataSource, TradeId},
};

/// Trade record as a supplier hands it over, before any validation. Every economic field
/// is still text so that a malformed spreadsheet cell surfaces as a [`ValidationError`]
/// for that row rather than a parse failure for the whole file.
///
/// [`ValidationError`]: crate::error::ValidationError
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RawTrade {
    pub timestamp: String,
    pub symbol: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
    pub quote_quantity: String,
    pub fee: Option<String>,
    pub fee_currency: Option<String>,
    pub data_source: Option<String>,
}

/// A validated, normalised trade. Immutable once stored apart from `pnl`, which is a cache
/// of the cost-basis replay for its symbol.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Trade {
    pub id: TradeId,
    #[serde(with = "deserialization::timestamp_text")]
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub original_symbol: String,
    pub original_quote_currency: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub quote_quantity: Decimal,
    pub fee: Decimal,
    pub fee_currency: String,
    pub pnl: Option<Decimal>,
    pub data_source: DataSource,
    /// Store-assigned insertion ordinal; breaks timestamp ties deterministically.
    #[serde(default)]
    pub sequence: u64,
}

impl Trade {
    /// Total order used by every replay: execution time, then insertion order.
    pub fn chronological_key(&self) -> (NaiveDateTime, u64) {
        (self.timestamp, self.sequence)
    }

    pub fn is_winner(&self) -> bool {
        self.pnl.map_or(false, |pnl| pnl > Decimal::ZERO)
    }

    pub fn is_loser(&self) -> bool {
        self.pnl.map_or(false, |pnl| pnl < Decimal::ZERO)
    }
}

/// Sort trades in place by [`Trade::chronological_key`].
pub fn sort_chronologically(trades: &mut [Trade]) {
    trades.sort_by_key(Trade::chronological_key);
}
