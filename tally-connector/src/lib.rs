//! Trade suppliers: spreadsheet exports read from disk and the Binance spot account
//! trade list pulled over signed REST. Suppliers hand over [`RawTrade`]s untouched;
//! validation belongs to the journal.
//!
//! [`RawTrade`]: tally_model::trade::RawTrade

pub mod error;
pub mod exchange;
pub mod protocol;
pub mod source;
pub mod spreadsheet;
