use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_model::deserialization;

use crate::protocol::http::rest::request::RestRequest;

/// Permissions of the account behind an API key, as returned by `GET /api/v3/account`.
/// Balances are not kept.
///
/// See docs: <https://binance-docs.github.io/apidocs/spot/en/#account-information-user_data>
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinanceAccount {
    pub account_type: String,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    #[serde(deserialize_with = "deserialization::de_u64_epoch_ms_as_datetime_utc")]
    pub update_time: DateTime<Utc>,
}

/// Cheapest signed request: proves the key, the secret and the clock are all accepted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FetchAccount;

impl RestRequest for FetchAccount {
    type Response = BinanceAccount;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/account")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_de_binance_account() {
        let input = r#"{
            "makerCommission":15,"takerCommission":15,"buyerCommission":0,"sellerCommission":0,
            "canTrade":true,"canWithdraw":false,"canDeposit":true,"brokered":false,
            "requireSelfTradePrevention":false,"preventSor":false,"updateTime":1705314600000,
            "accountType":"SPOT","balances":[{"asset":"BTC","free":"0.1","locked":"0"}],
            "permissions":["SPOT"],"uid":354937868
        }"#;

        let account = serde_json::from_str::<BinanceAccount>(input).unwrap();
        assert_eq!(account.account_type, "SPOT");
        assert!(account.can_trade);
        assert!(!account.can_withdraw);
        assert_eq!(account.update_time.timestamp_millis(), 1705314600000);
    }
}
