use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STABLE_UNITS: [&str; 5] = ["USDT", "USDC", "FDUSD", "BUSD", "DAI"];
pub const DEFAULT_CANONICAL_UNIT: &str = "USDT";
pub const DEFAULT_QUOTE_CURRENCIES: [&str; 8] =
    ["USDT", "USDC", "FDUSD", "BUSD", "DAI", "BTC", "ETH", "BNB"];

/// A trading pair split into the asset traded and the unit its price is quoted in.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Deserialize, Serialize)]
pub struct Instrument {
    pub base_currency: String,
    pub quote_currency: String,
}

impl Instrument {
    pub fn new<S>(base_currency: S, quote_currency: S) -> Self
    where
        S: Into<String>,
    {
        Instrument {
            base_currency: base_currency.into().to_uppercase(),
            quote_currency: quote_currency.into().to_uppercase(),
        }
    }
}

/// Collapses economically equivalent stable quote units onto one canonical unit so that
/// `XRPFDUSD`, `XRPUSDC` and `XRPUSDT` all account as the same instrument.
///
/// Amount conversion between stable units is 1:1. That is a simplification, not a claim of
/// real-world parity; [`SymbolNormalizer::normalize_amount`] is the single place a rate
/// would be applied.
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct SymbolNormalizer {
    stable_units: Vec<String>,
    canonical_unit: String,
    quote_currencies: Vec<String>,
}

impl Default for SymbolNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STABLE_UNITS, DEFAULT_CANONICAL_UNIT, DEFAULT_QUOTE_CURRENCIES)
    }
}

impl SymbolNormalizer {
    pub fn new<Units, Quotes, S, Q>(stable_units: Units, canonical_unit: &str, quote_currencies: Quotes) -> Self
    where
        Units: IntoIterator<Item = S>,
        Quotes: IntoIterator<Item = Q>,
        S: AsRef<str>,
        Q: AsRef<str>,
    {
        Self {
            stable_units: stable_units
                .into_iter()
                .map(|unit| unit.as_ref().trim().to_uppercase())
                .collect(),
            canonical_unit: canonical_unit.trim().to_uppercase(),
            quote_currencies: quote_currencies
                .into_iter()
                .map(|quote| quote.as_ref().trim().to_uppercase())
                .collect(),
        }
    }

    pub fn canonical_unit(&self) -> &str {
        &self.canonical_unit
    }

    pub fn is_stable(&self, currency: &str) -> bool {
        let currency = currency.trim();
        self.stable_units
            .iter()
            .any(|unit| unit.eq_ignore_ascii_case(currency))
    }

    /// Rewrite a raw pair into `base + canonical unit` when it is quoted in a stable unit.
    /// Anything else comes back upper-cased and otherwise unchanged.
    pub fn normalize(&self, symbol: &str) -> String {
        let symbol = compact_symbol(symbol);
        match self.split_stable(&symbol) {
            Some((base, _)) => format!("{}{}", base, self.canonical_unit),
            None => symbol,
        }
    }

    /// The stable unit a raw pair was actually quoted in, eg/ "FDUSD" for "XRP/FDUSD".
    pub fn quote_alias(&self, symbol: &str) -> Option<String> {
        let symbol = compact_symbol(symbol);
        self.split_stable(&symbol).map(|(_, unit)| unit.to_owned())
    }

    /// Stable units convert 1:1. Any other pair also passes through unchanged, since the
    /// ledger has no price source.
    pub fn normalize_amount(&self, amount: Decimal, _from_currency: &str, _to_currency: &str) -> Decimal {
        amount
    }

    /// Strip the first known quote suffix, eg/ "BTCUSDT" -> "BTC".
    pub fn base_currency(&self, symbol: &str) -> String {
        self.instrument(symbol)
            .map(|instrument| instrument.base_currency)
            .unwrap_or_else(|| compact_symbol(symbol))
    }

    pub fn instrument(&self, symbol: &str) -> Option<Instrument> {
        let symbol = compact_symbol(symbol);
        self.quote_currencies.iter().find_map(|quote| {
            symbol
                .strip_suffix(quote.as_str())
                .filter(|base| !base.is_empty())
                .map(|base| Instrument::new(base, quote.as_str()))
        })
    }

    fn split_stable<'a>(&'a self, symbol: &'a str) -> Option<(&'a str, &'a str)> {
        self.stable_units.iter().find_map(|unit| {
            symbol
                .strip_suffix(unit.as_str())
                .filter(|base| !base.is_empty())
                .map(|base| (base, unit.as_str()))
        })
    }
}

/// Upper-case and drop pair separators, eg/ "xrp/fdusd" -> "XRPFDUSD".
pub fn compact_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| !matches!(c, '/' | '-' | '_' | ' '))
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_normalize() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let normalizer = SymbolNormalizer::default();
        let cases = vec![
            TestCase { input: "XRPUSDT", expected: "XRPUSDT" },
            TestCase { input: "XRPFDUSD", expected: "XRPUSDT" },
            TestCase { input: "xrpusdc", expected: "XRPUSDT" },
            TestCase { input: "BTC/FDUSD", expected: "BTCUSDT" },
            TestCase { input: "ETHBUSD", expected: "ETHUSDT" },
            TestCase { input: "ETHBTC", expected: "ETHBTC" },
            // TC6: a bare stable unit has no base to keep
            TestCase { input: "USDT", expected: "USDT" },
            TestCase { input: "bnbeth", expected: "BNBETH" },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(normalizer.normalize(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_quote_alias() {
        let normalizer = SymbolNormalizer::default();
        assert_eq!(normalizer.quote_alias("XRP/FDUSD").as_deref(), Some("FDUSD"));
        assert_eq!(normalizer.quote_alias("SOLUSDC").as_deref(), Some("USDC"));
        assert_eq!(normalizer.quote_alias("ETHBTC"), None);
    }

    #[test]
    fn test_base_currency() {
        struct TestCase {
            input: &'static str,
            expected: &'static str,
        }

        let normalizer = SymbolNormalizer::default();
        let cases = vec![
            TestCase { input: "BTCUSDT", expected: "BTC" },
            TestCase { input: "xrpfdusd", expected: "XRP" },
            TestCase { input: "ETHBTC", expected: "ETH" },
            TestCase { input: "DOGE", expected: "DOGE" },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            assert_eq!(normalizer.base_currency(test.input), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_normalize_amount_is_passthrough() {
        let normalizer = SymbolNormalizer::default();
        assert_eq!(normalizer.normalize_amount(dec!(12.5), "FDUSD", "USDT"), dec!(12.5));
        assert_eq!(normalizer.normalize_amount(dec!(3), "BTC", "USDT"), dec!(3));
    }

    #[test]
    fn test_custom_canonical_unit() {
        let normalizer = SymbolNormalizer::new(["USDC", "USDT"], "usdc", ["USDC", "USDT"]);
        assert_eq!(normalizer.normalize("BTCUSDT"), "BTCUSDC");
        assert!(normalizer.is_stable("usdt"));
        assert!(!normalizer.is_stable("BNB"));
    }
}
