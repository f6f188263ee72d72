use std::{
    borrow::Cow,
    fmt::{self, Debug, Display},
};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{deserialization::TIMESTAMP_FORMAT, enums::Side};

/// Hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LENGTH: usize = 16;

/// Content-addressed trade identifier. Re-importing the same economic trade from any
/// source always yields the same [`TradeId`], which is what makes ingestion idempotent.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeId(pub String);

impl<S> From<S> for TradeId
where
    S: Into<String>,
{
    fn from(id: S) -> Self {
        Self(id.into())
    }
}

impl Debug for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TradeId({})", self.0)
    }
}

impl Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TradeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TradeId {
    /// SHA-256 over the six economic key fields, truncated to [`FINGERPRINT_LENGTH`] hex
    /// characters. Decimals are normalised first so "0.10" and "0.1" agree.
    pub fn fingerprint(
        timestamp: &NaiveDateTime,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        quote_quantity: Decimal,
    ) -> Self {
        let key = format!(
            "{}-{}-{}-{}-{}-{}",
            timestamp.format(TIMESTAMP_FORMAT),
            symbol,
            side,
            price.normalize(),
            quantity.normalize(),
            quote_quantity.normalize(),
        );

        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        Self(digest[..FINGERPRINT_LENGTH].to_owned())
    }
}

/// Provenance tag of a trade record. Informational only, never part of the fingerprint.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataSource(Cow<'static, str>);

impl DataSource {
    pub const SPREADSHEET: DataSource = DataSource(Cow::Borrowed("spreadsheet"));
    pub const EXCHANGE_API: DataSource = DataSource(Cow::Borrowed("exchange_api"));
    pub const TEST: DataSource = DataSource(Cow::Borrowed("test"));

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::SPREADSHEET
    }
}

impl<S> From<S> for DataSource
where
    S: Into<Cow<'static, str>>,
{
    fn from(source: S) -> Self {
        Self(source.into())
    }
}

impl Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataSource({})", self.0)
    }
}

impl Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .unwrap()
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let first = TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500));
        let second = TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500));

        assert_eq!(first, second);
        assert_eq!(first.0.len(), FINGERPRINT_LENGTH);
        assert!(first.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_ignores_decimal_scale() {
        let plain = TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500));
        let padded = TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000.00), dec!(0.100), dec!(4500.0));
        assert_eq!(plain, padded);
    }

    #[test]
    fn test_fingerprint_changes_with_every_key_field() {
        let base = TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500));
        let later = timestamp() + chrono::Duration::seconds(1);

        let variants = vec![
            TradeId::fingerprint(&later, "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500)),
            TradeId::fingerprint(&timestamp(), "ETHUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4500)),
            TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Sell, dec!(45000), dec!(0.1), dec!(4500)),
            TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45001), dec!(0.1), dec!(4500)),
            TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.2), dec!(4500)),
            TradeId::fingerprint(&timestamp(), "BTCUSDT", Side::Buy, dec!(45000), dec!(0.1), dec!(4501)),
        ];

        for (index, variant) in variants.into_iter().enumerate() {
            assert_ne!(variant, base, "TC{} failed", index);
        }
    }

    #[test]
    fn test_data_source_default() {
        assert_eq!(DataSource::default(), DataSource::SPREADSHEET);
        assert_eq!(DataSource::from("binance_api").to_string(), "binance_api");
    }
}
