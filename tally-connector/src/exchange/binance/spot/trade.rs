use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_model::{deserialization, enums::Side, identifiers::DataSource, trade::RawTrade};

use crate::protocol::http::rest::request::RestRequest;

/// Maximum page size accepted by `GET /api/v3/myTrades`.
pub const MY_TRADES_LIMIT: u32 = 1000;

/// Binance account trade (one fill) returned by `GET /api/v3/myTrades`.
///
/// ### Raw Payload Examples
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#account-trade-list-user_data>
/// ```json
/// {
///     "symbol": "BNBBTC",
///     "id": 28457,
///     "orderId": 100234,
///     "orderListId": -1,
///     "price": "4.00000100",
///     "qty": "12.00000000",
///     "quoteQty": "48.000012",
///     "commission": "10.10000000",
///     "commissionAsset": "BNB",
///     "time": 1499865549590,
///     "isBuyer": true,
///     "isMaker": false,
///     "isBestMatch": true
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceMyTrade {
    pub symbol: String,
    pub id: u64,
    pub order_id: u64,
    #[serde(deserialize_with = "deserialization::de_str")]
    pub price: Decimal,
    #[serde(deserialize_with = "deserialization::de_str")]
    pub qty: Decimal,
    #[serde(deserialize_with = "deserialization::de_str")]
    pub quote_qty: Decimal,
    #[serde(deserialize_with = "deserialization::de_str")]
    pub commission: Decimal,
    pub commission_asset: String,
    #[serde(deserialize_with = "deserialization::de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
    pub is_buyer: bool,
    pub is_maker: bool,
}

impl BinanceMyTrade {
    pub fn side(&self) -> Side {
        if self.is_buyer {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

impl From<BinanceMyTrade> for RawTrade {
    fn from(trade: BinanceMyTrade) -> Self {
        Self {
            timestamp: trade
                .time
                .naive_utc()
                .format(deserialization::TIMESTAMP_FORMAT)
                .to_string(),
            side: trade.side().as_str().to_owned(),
            symbol: trade.symbol,
            price: trade.price.to_string(),
            quantity: trade.qty.to_string(),
            quote_quantity: trade.quote_qty.to_string(),
            fee: Some(trade.commission.to_string()),
            fee_currency: Some(trade.commission_asset),
            data_source: Some(DataSource::EXCHANGE_API.to_string()),
        }
    }
}

/// Query parameters of `GET /api/v3/myTrades`. Binance rejects `startTime` combined with
/// `fromId`, so exactly one cursor is set.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyTradesQuery {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_id: Option<u64>,
    pub limit: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FetchMyTrades {
    pub query: MyTradesQuery,
}

impl FetchMyTrades {
    /// First page: fills executed at or after `start_time` (epoch ms).
    pub fn starting(symbol: &str, start_time: i64) -> Self {
        Self {
            query: MyTradesQuery {
                symbol: symbol.to_owned(),
                start_time: Some(start_time),
                from_id: None,
                limit: MY_TRADES_LIMIT,
            },
        }
    }

    /// Follow-up page: fills with trade id at or above `from_id`.
    pub fn from_id(symbol: &str, from_id: u64) -> Self {
        Self {
            query: MyTradesQuery {
                symbol: symbol.to_owned(),
                start_time: None,
                from_id: Some(from_id),
                limit: MY_TRADES_LIMIT,
            },
        }
    }
}

impl RestRequest for FetchMyTrades {
    type Response = Vec<BinanceMyTrade>;
    type QueryParams = MyTradesQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/myTrades")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}
