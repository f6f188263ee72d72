pub mod account;
pub mod trade;

/// Production REST host of Binance spot.
pub const HTTP_BASE_URL_BINANCE_SPOT: &str = "https://api.binance.com";
