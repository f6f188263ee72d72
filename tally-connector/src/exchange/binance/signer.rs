use chrono::Utc;
use hmac::Mac;
use reqwest::RequestBuilder;

use crate::{
    error::SourceError,
    protocol::http::{private::Signer, rest::request::RestRequest},
};

pub const HEADER_API_KEY: &str = "X-MBX-APIKEY";
pub const DEFAULT_RECV_WINDOW: u64 = 5000;

/// Signs `USER_DATA` requests: HMAC-SHA256 over the full query string, sent back as the
/// trailing `signature` parameter.
#[derive(Debug, Clone)]
pub struct BinanceSigner {
    pub api_key: String,
    pub recv_window: u64,
}

/// Configuration required to sign every Binance `RestRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinanceSignConfig<'a> {
    pub api_key: &'a str,
    /// Request parameters followed by `recvWindow` and `timestamp`, exactly as sent.
    pub query: String,
}

impl BinanceSigner {
    pub fn new<S: Into<String>>(api_key: S, recv_window: u64) -> Self {
        Self {
            api_key: api_key.into(),
            recv_window,
        }
    }
}

/// Append the timing parameters Binance requires on every signed request.
pub fn signed_query(params: &str, recv_window: u64, timestamp: i64) -> String {
    let timing = format!("recvWindow={recv_window}&timestamp={timestamp}");
    if params.is_empty() {
        timing
    } else {
        format!("{params}&{timing}")
    }
}

impl Signer for BinanceSigner {
    type Config<'a> = BinanceSignConfig<'a> where Self: 'a;

    fn config<'a, Request>(&'a self, request: Request, _: &RequestBuilder) -> Result<Self::Config<'a>, SourceError>
    where
        Request: RestRequest,
    {
        let params = request
            .query_params()
            .map(serde_urlencoded::to_string)
            .transpose()?
            .unwrap_or_default();

        Ok(BinanceSignConfig {
            api_key: self.api_key.as_str(),
            query: signed_query(&params, self.recv_window, Utc::now().timestamp_millis()),
        })
    }

    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac,
    {
        mac.update(config.query.as_bytes());
    }

    fn build_signed_request(
        config: Self::Config<'_>,
        builder: RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SourceError> {
        let mut request = builder.header(HEADER_API_KEY, config.api_key).build()?;

        // Replace whatever query the builder serialised with the exact bytes that were signed
        request
            .url_mut()
            .set_query(Some(&format!("{}&signature={}", config.query, signature)));

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::private::encoder::{Encoder, HexEncoder};
    use hmac::Hmac;
    use sha2::Sha256;

    const SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const QUERY: &str =
        "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const SIGNATURE: &str = "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71";

    fn sign(query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        BinanceSigner::add_bytes_to_sign(
            &mut mac,
            &BinanceSignConfig {
                api_key: "key",
                query: query.to_owned(),
            },
        );
        HexEncoder.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_signature_matches_documented_vector() {
        assert_eq!(sign(QUERY), SIGNATURE);
        assert_eq!(sign(QUERY), sign(QUERY));
        assert_ne!(sign(&QUERY.replace("price=0.1", "price=0.2")), SIGNATURE);
    }

    #[test]
    fn test_signed_query() {
        struct TestCase {
            params: &'static str,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: request parameters come first
                params: "symbol=BTCUSDT&fromId=5&limit=1000",
                expected: "symbol=BTCUSDT&fromId=5&limit=1000&recvWindow=5000&timestamp=1499827319559",
            },
            TestCase {
                // TC1: no request parameters
                params: "",
                expected: "recvWindow=5000&timestamp=1499827319559",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = signed_query(test.params, DEFAULT_RECV_WINDOW, 1499827319559);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_build_signed_request() {
        let builder = reqwest::Client::new()
            .get("https://api.binance.com/api/v3/myTrades")
            .query(&[("symbol", "BTCUSDT")]);
        let config = BinanceSignConfig {
            api_key: "my-key",
            query: "symbol=BTCUSDT&recvWindow=5000&timestamp=1".to_owned(),
        };

        let request = BinanceSigner::build_signed_request(config, builder, "abc123".to_owned()).unwrap();

        assert_eq!(
            request.url().query(),
            Some("symbol=BTCUSDT&recvWindow=5000&timestamp=1&signature=abc123")
        );
        assert_eq!(request.headers()[HEADER_API_KEY], "my-key");
    }
}
