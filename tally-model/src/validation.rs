use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    deserialization::parse_timestamp,
    enums::Side,
    error::ValidationError,
    identifiers::{DataSource, TradeId},
    instruments::{compact_symbol, SymbolNormalizer},
    trade::{RawTrade, Trade},
};

/// Share of failed rows above which a whole batch is refused as a data-quality signal.
pub const DEFAULT_REJECTION_THRESHOLD: f64 = 0.5;

/// Fee unit assumed when a source omits it; spot exchanges bill BNB by default.
pub const DEFAULT_FEE_CURRENCY: &str = "BNB";

/// Number of failure samples carried by a [`ValidationError::BatchQuality`].
const MAX_FAILURE_SAMPLES: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub index: usize,
    pub error: ValidationError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SanitizedBatch {
    pub trades: Vec<Trade>,
    pub rejected: Vec<RejectedRecord>,
}

impl SanitizedBatch {
    pub fn total(&self) -> usize {
        self.trades.len() + self.rejected.len()
    }
}

/// Validate one raw record into a normalised [`Trade`] with its fingerprint. The store
/// assigns `sequence`; `pnl` stays empty until the cost-basis replay runs.
pub fn validate(raw: &RawTrade, normalizer: &SymbolNormalizer) -> Result<Trade, ValidationError> {
    let timestamp = required("timestamp", &raw.timestamp)
        .and_then(|input| parse_timestamp(input).ok_or_else(|| ValidationError::InvalidTimestamp(input.to_owned())))?;

    let original_symbol = compact_symbol(required("symbol", &raw.symbol)?);
    if !original_symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidSymbol(raw.symbol.clone()));
    }
    let symbol = normalizer.normalize(&original_symbol);
    let original_quote_currency = normalizer
        .quote_alias(&original_symbol)
        .unwrap_or_else(|| normalizer.canonical_unit().to_owned());

    let side = required("side", &raw.side)?.parse::<Side>()?;
    let price = positive_decimal("price", &raw.price)?;
    let quantity = positive_decimal("quantity", &raw.quantity)?;
    let quote_quantity = normalizer.normalize_amount(
        positive_decimal("quote_quantity", &raw.quote_quantity)?,
        &original_quote_currency,
        normalizer.canonical_unit(),
    );

    let fee = match raw.fee.as_deref().map(str::trim).filter(|fee| !fee.is_empty()) {
        Some(fee) => non_negative_decimal("fee", fee)?,
        None => Decimal::ZERO,
    };
    let fee_currency = raw
        .fee_currency
        .as_deref()
        .map(str::trim)
        .filter(|currency| !currency.is_empty())
        .unwrap_or(DEFAULT_FEE_CURRENCY)
        .to_uppercase();

    let data_source = raw
        .data_source
        .as_deref()
        .map(str::trim)
        .filter(|source| !source.is_empty())
        .map(|source| DataSource::from(source.to_owned()))
        .unwrap_or_default();

    Ok(Trade {
        id: TradeId::fingerprint(&timestamp, &symbol, side, price, quantity, quote_quantity),
        timestamp,
        symbol,
        original_symbol,
        original_quote_currency,
        side,
        price,
        quantity,
        quote_quantity,
        fee,
        fee_currency,
        pnl: None,
        data_source,
        sequence: 0,
    })
}

/// Validate a whole batch. Bad rows are collected rather than aborting the batch, unless
/// their share exceeds `threshold`, in which case the batch is refused outright.
pub fn sanitize_batch(
    raws: &[RawTrade],
    normalizer: &SymbolNormalizer,
    threshold: f64,
) -> Result<SanitizedBatch, ValidationError> {
    let mut batch = SanitizedBatch::default();

    for (index, raw) in raws.iter().enumerate() {
        match validate(raw, normalizer) {
            Ok(trade) => batch.trades.push(trade),
            Err(error) => {
                debug!(index, %error, "rejected raw trade record");
                batch.rejected.push(RejectedRecord { index, error });
            }
        }
    }

    let failed = batch.rejected.len();
    let total = raws.len();
    if failed > 0 && failed as f64 > total as f64 * threshold {
        warn!(failed, total, threshold, "raw trade batch refused on data quality");
        return Err(ValidationError::BatchQuality {
            failed,
            total,
            threshold,
            samples: batch
                .rejected
                .iter()
                .take(MAX_FAILURE_SAMPLES)
                .map(|rejected| format!("row {}: {}", rejected.index + 1, rejected.error))
                .collect(),
        });
    }

    Ok(batch)
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ValidationError> {
    let cleaned = required(field, value)?.replace(',', "");
    cleaned
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| ValidationError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

fn positive_decimal(field: &'static str, value: &str) -> Result<Decimal, ValidationError> {
    let decimal = parse_decimal(field, value)?;
    if decimal <= Decimal::ZERO {
        return Err(ValidationError::NonPositive {
            field,
            value: value.to_owned(),
        });
    }
    Ok(decimal)
}

fn non_negative_decimal(field: &'static str, value: &str) -> Result<Decimal, ValidationError> {
    let decimal = parse_decimal(field, value)?;
    if decimal < Decimal::ZERO {
        return Err(ValidationError::Negative {
            field,
            value: value.to_owned(),
        });
    }
    Ok(decimal)
}
