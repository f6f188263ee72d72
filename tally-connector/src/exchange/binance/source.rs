use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tally_model::{identifiers::DataSource, trade::RawTrade};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::SourceError,
    protocol::http::{
        private::{encoder::HexEncoder, RequestSigner},
        rest::client::RestClient,
    },
    source::{FetchFailure, FetchOutcome, TradeSource},
};

use super::{
    signer::{BinanceSigner, DEFAULT_RECV_WINDOW},
    spot::{
        account::{BinanceAccount, FetchAccount},
        trade::{BinanceMyTrade, FetchMyTrades, MY_TRADES_LIMIT},
        HTTP_BASE_URL_BINANCE_SPOT,
    },
    BinanceParser,
};

/// Pause between consecutive requests, across pages and across symbols.
const PAGE_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

pub type BinanceRestClient =
    RestClient<'static, RequestSigner<BinanceSigner, Hmac<Sha256>, HexEncoder>, BinanceParser>;

/// Pulls the account's spot fills for a fixed list of symbols from `GET /api/v3/myTrades`.
pub struct BinanceSource {
    client: BinanceRestClient,
    symbols: Vec<String>,
    lookback_days: u32,
}

impl BinanceSource {
    pub fn builder() -> BinanceSourceBuilder {
        BinanceSourceBuilder::new()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Epoch ms the first page starts from: `since`, or `lookback_days` before now.
    fn start_time(&self, since: Option<NaiveDateTime>) -> i64 {
        since
            .map(|since| since.and_utc().timestamp_millis())
            .unwrap_or_else(|| (Utc::now() - chrono::Duration::days(i64::from(self.lookback_days))).timestamp_millis())
    }

    /// Every fill of `symbol` from `start_time`, walking forward by trade id.
    pub async fn fetch_symbol(&self, symbol: &str, start_time: i64) -> Result<Vec<BinanceMyTrade>, SourceError> {
        let mut fills = Vec::new();
        let mut request = FetchMyTrades::starting(symbol, start_time);

        loop {
            let (_, page) = self.client.execute(request).await?;
            let page_len = page.len();
            let last_id = page.last().map(|fill| fill.id);
            fills.extend(page);

            debug!(symbol, page_len, total = fills.len(), "fetched myTrades page");

            match last_id {
                Some(last_id) if page_len >= MY_TRADES_LIMIT as usize => {
                    request = FetchMyTrades::from_id(symbol, last_id + 1);
                    tokio::time::sleep(PAGE_INTERVAL).await;
                }
                _ => break,
            }
        }

        info!(symbol, fills = fills.len(), "fetched Binance fills");
        Ok(fills)
    }

    /// Signed `GET /api/v3/account`, used to confirm the credentials before a sync.
    pub async fn check_connection(&self) -> Result<BinanceAccount, SourceError> {
        let (_, account) = self.client.execute(FetchAccount).await?;
        info!(account_type = %account.account_type, can_trade = account.can_trade, "Binance credentials accepted");
        Ok(account)
    }
}

#[async_trait]
impl TradeSource for BinanceSource {
    fn data_source(&self) -> DataSource {
        DataSource::EXCHANGE_API
    }

    /// Symbols are fetched one after another. A symbol that fails is logged and reported
    /// in the outcome; the remaining symbols are still fetched.
    async fn fetch_trades(&self, since: Option<NaiveDateTime>) -> Result<FetchOutcome, SourceError> {
        let start_time = self.start_time(since);
        let mut outcome = FetchOutcome::default();

        for (index, symbol) in self.symbols.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(PAGE_INTERVAL).await;
            }

            match self.fetch_symbol(symbol, start_time).await {
                Ok(fills) => outcome.trades.extend(fills.into_iter().map(RawTrade::from)),
                Err(error) => {
                    warn!(symbol = %symbol, %error, "failed to fetch Binance fills, continuing");
                    outcome.failures.push(FetchFailure {
                        symbol: symbol.clone(),
                        error,
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Default)]
pub struct BinanceSourceBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    recv_window: Option<u64>,
    symbols: Option<Vec<String>>,
    lookback_days: Option<u32>,
}

impl BinanceSourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url<S: Into<String>>(self, value: S) -> Self {
        Self {
            base_url: Some(value.into()),
            ..self
        }
    }

    pub fn credentials<K: Into<String>, S: Into<String>>(self, api_key: K, api_secret: S) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
            ..self
        }
    }

    pub fn recv_window(self, value: u64) -> Self {
        Self {
            recv_window: Some(value),
            ..self
        }
    }

    pub fn symbols<I, S>(self, value: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbols: Some(
                value
                    .into_iter()
                    .map(|symbol| symbol.as_ref().trim().to_uppercase())
                    .filter(|symbol| !symbol.is_empty())
                    .collect(),
            ),
            ..self
        }
    }

    pub fn lookback_days(self, value: u32) -> Self {
        Self {
            lookback_days: Some(value),
            ..self
        }
    }

    pub fn build(self) -> Result<BinanceSource, SourceError> {
        let api_key = self.api_key.filter(|key| !key.is_empty()).ok_or(SourceError::MissingCredentials)?;
        let api_secret = self
            .api_secret
            .filter(|secret| !secret.is_empty())
            .ok_or(SourceError::MissingCredentials)?;

        let base_url = self.base_url.unwrap_or_else(|| HTTP_BASE_URL_BINANCE_SPOT.to_owned());
        Url::parse(&base_url)?;

        let mac = Hmac::<Sha256>::new_from_slice(api_secret.as_bytes())?;
        let strategy = RequestSigner::new(
            BinanceSigner::new(api_key, self.recv_window.unwrap_or(DEFAULT_RECV_WINDOW)),
            mac,
            HexEncoder,
        );

        Ok(BinanceSource {
            client: RestClient::new(base_url.trim_end_matches('/').to_owned(), strategy, BinanceParser),
            symbols: self.symbols.unwrap_or_default(),
            lookback_days: self.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_model::deserialization::parse_timestamp;

    #[test]
    fn test_builder_requires_credentials() {
        struct TestCase {
            builder: BinanceSourceBuilder,
            expect_ok: bool,
        }

        let tests = vec![
            TestCase {
                // TC0: no credentials
                builder: BinanceSource::builder(),
                expect_ok: false,
            },
            TestCase {
                // TC1: empty secret
                builder: BinanceSource::builder().credentials("key", ""),
                expect_ok: false,
            },
            TestCase {
                // TC2: malformed base url
                builder: BinanceSource::builder().credentials("key", "secret").base_url("not a url"),
                expect_ok: false,
            },
            TestCase {
                // TC3: valid
                builder: BinanceSource::builder()
                    .credentials("key", "secret")
                    .base_url("https://testnet.binance.vision/"),
                expect_ok: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.builder.build().is_ok(), test.expect_ok, "TC{} failed", index);
        }
    }

    #[test]
    fn test_symbols_are_upper_cased() {
        let source = BinanceSource::builder()
            .credentials("key", "secret")
            .symbols(["btcusdt", " ETHUSDT ", ""])
            .build()
            .unwrap();

        assert_eq!(source.symbols(), ["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_start_time_prefers_watermark() {
        let source = BinanceSource::builder()
            .credentials("key", "secret")
            .lookback_days(3)
            .build()
            .unwrap();

        let since = parse_timestamp("2024-01-15 10:30:00").unwrap();
        assert_eq!(source.start_time(Some(since)), 1705314600000);

        let lookback = Utc::now().timestamp_millis() - source.start_time(None);
        assert!((3 * 86_400_000 - 1000..=3 * 86_400_000 + 1000).contains(&lookback));
    }

    #[tokio::test]
    async fn test_failed_symbols_do_not_stop_sync() {
        // Nothing listens on the discard port, so every request fails fast
        let source = BinanceSource::builder()
            .credentials("key", "secret")
            .base_url("http://127.0.0.1:9")
            .symbols(["BTCUSDT", "ETHUSDT"])
            .build()
            .unwrap();

        let outcome = source.fetch_trades(None).await.unwrap();
        let failed = outcome
            .failures
            .iter()
            .map(|failure| failure.symbol.as_str())
            .collect::<Vec<_>>();

        assert!(outcome.trades.is_empty());
        assert!(!outcome.is_complete());
        assert_eq!(failed, vec!["BTCUSDT", "ETHUSDT"]);
        assert!(outcome
            .failures
            .iter()
            .all(|failure| matches!(failure.error, SourceError::Http(_))));
    }

    #[test]
    fn test_account_request_is_signed() {
        let source = BinanceSource::builder()
            .credentials("key", "secret")
            .build()
            .unwrap();

        let request = source.client.build(FetchAccount).unwrap();
        let query = request.url().query().unwrap_or_default();
        assert_eq!(request.url().path(), "/api/v3/account");
        assert!(query.starts_with("recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
    }

    #[test]
    fn test_build_request_is_signed() {
        let source = BinanceSource::builder()
            .credentials("key", "secret")
            .build()
            .unwrap();

        let request = source
            .client
            .build(FetchMyTrades::from_id("BTCUSDT", 42))
            .unwrap();

        let query = request.url().query().unwrap_or_default();
        assert_eq!(request.url().path(), "/api/v3/myTrades");
        assert!(query.starts_with("symbol=BTCUSDT&fromId=42&limit=1000&recvWindow=5000&timestamp="));
        assert!(query.contains("&signature="));
        assert_eq!(request.headers()["X-MBX-APIKEY"], "key");
    }
}
