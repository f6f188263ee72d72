use std::{io::Read, path::PathBuf, str::FromStr};

use async_trait::async_trait;
use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;
use tally_model::{deserialization::TIMESTAMP_FORMAT, identifiers::DataSource, trade::RawTrade};
use tracing::{debug, info};

use crate::{
    error::SourceError,
    source::{FetchOutcome, TradeSource},
};

const TIMESTAMP_HEADERS: &[&str] = &["date(utc)", "date", "time", "utc_time", "timestamp", "时间"];
const SYMBOL_HEADERS: &[&str] = &["pair", "symbol", "market", "交易对"];
const SIDE_HEADERS: &[&str] = &["side", "type", "类型"];
const PRICE_HEADERS: &[&str] = &["price", "价格"];
const QUANTITY_HEADERS: &[&str] = &["executed", "quantity", "qty", "数量"];
const QUOTE_HEADERS: &[&str] = &["amount", "total", "quote_quantity", "成交额"];
const FEE_HEADERS: &[&str] = &["fee", "手续费"];
const FEE_CURRENCY_HEADERS: &[&str] = &["fee coin", "fee_currency", "fee currency", "fee_coin", "手续费结算币种"];

/// File extensions read as workbooks; anything else is read as CSV.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Column positions resolved from a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnMap {
    timestamp: usize,
    symbol: usize,
    side: usize,
    price: usize,
    quantity: usize,
    quote_quantity: usize,
    fee: Option<usize>,
    fee_currency: Option<usize>,
}

impl ColumnMap {
    fn resolve(headers: &StringRecord) -> Result<Self, SourceError> {
        let find = |aliases: &[&str]| {
            headers.iter().position(|header| {
                let header = header.trim_start_matches('\u{feff}').trim().to_lowercase();
                aliases.iter().any(|alias| header == *alias)
            })
        };
        let require = |aliases: &[&str], column: &'static str| find(aliases).ok_or(SourceError::MissingColumn(column));

        Ok(Self {
            timestamp: require(TIMESTAMP_HEADERS, "time")?,
            symbol: require(SYMBOL_HEADERS, "pair")?,
            side: require(SIDE_HEADERS, "side")?,
            price: require(PRICE_HEADERS, "price")?,
            quantity: require(QUANTITY_HEADERS, "executed")?,
            quote_quantity: require(QUOTE_HEADERS, "amount")?,
            fee: find(FEE_HEADERS),
            fee_currency: find(FEE_CURRENCY_HEADERS),
        })
    }

    fn raw_trade(&self, record: &StringRecord, data_source: &DataSource) -> RawTrade {
        let cell = |index: usize| record.get(index).unwrap_or_default().trim();
        let (fee, fee_suffix) = self.fee.map(|index| split_asset(cell(index))).unwrap_or_default();
        let fee_currency = self
            .fee_currency
            .map(|index| cell(index).to_owned())
            .filter(|currency| !currency.is_empty())
            .or(fee_suffix);

        RawTrade {
            timestamp: cell(self.timestamp).to_owned(),
            symbol: cell(self.symbol).to_owned(),
            side: cell(self.side).to_owned(),
            price: split_asset(cell(self.price)).0,
            quantity: split_asset(cell(self.quantity)).0,
            quote_quantity: split_asset(cell(self.quote_quantity)).0,
            fee: Some(fee).filter(|fee| !fee.is_empty()),
            fee_currency,
            data_source: Some(data_source.to_string()),
        }
    }

    /// Map every non-blank record to a raw trade.
    fn raw_trades<Records>(&self, records: Records, data_source: &DataSource) -> Vec<RawTrade>
    where
        Records: IntoIterator<Item = StringRecord>,
    {
        records
            .into_iter()
            .filter(|record| !record.iter().all(|cell| cell.trim().is_empty()))
            .map(|record| self.raw_trade(&record, data_source))
            .collect()
    }
}

/// Split an exported cell such as "0.1BTC" into its number and trailing asset code. A cell
/// that already reads as a number, scientific notation included, is kept whole.
pub fn split_asset(cell: &str) -> (String, Option<String>) {
    let cell = cell.trim();
    if is_number(cell) {
        return (cell.to_owned(), None);
    }

    let number = cell.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let asset = &cell[number.len()..];
    (
        number.trim().to_owned(),
        (!asset.is_empty()).then(|| asset.to_uppercase()),
    )
}

fn is_number(cell: &str) -> bool {
    let cell = cell.replace(',', "");
    Decimal::from_str(&cell).is_ok() || Decimal::from_scientific(&cell).is_ok()
}

/// Trade history exported from the exchange website, as CSV or as a workbook, with
/// English or Chinese headers.
#[derive(Debug, Clone)]
pub struct SpreadsheetSource {
    path: PathBuf,
}

impl SpreadsheetSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn is_workbook(&self) -> bool {
        self.path
            .extension()
            .and_then(|extension| extension.to_str())
            .map_or(false, |extension| {
                WORKBOOK_EXTENSIONS
                    .iter()
                    .any(|known| extension.eq_ignore_ascii_case(known))
            })
    }

    /// Read the whole export, choosing the reader by file extension.
    pub fn read(&self) -> Result<Vec<RawTrade>, SourceError> {
        let trades = if self.is_workbook() {
            let mut workbook = open_workbook_auto(&self.path)?;
            let range = workbook.worksheet_range_at(0).ok_or(SourceError::EmptyWorkbook)??;
            parse_range(&range, &DataSource::SPREADSHEET)?
        } else {
            parse_trades(std::fs::File::open(&self.path)?, &DataSource::SPREADSHEET)?
        };

        info!(
            path = %self.path.display(),
            workbook = self.is_workbook(),
            rows = trades.len(),
            "read spreadsheet trades"
        );
        Ok(trades)
    }
}

/// Parse CSV rows into raw trades. Blank rows are skipped; everything else is passed on
/// unvalidated.
pub fn parse_trades<R: Read>(reader: R, data_source: &DataSource) -> Result<Vec<RawTrade>, SourceError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let columns = ColumnMap::resolve(reader.headers()?)?;
    debug!(?columns, "resolved spreadsheet columns");

    let records = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(columns.raw_trades(records, data_source))
}

/// Parse the first worksheet of a workbook. The first row is the header row.
pub fn parse_range(range: &Range<Data>, data_source: &DataSource) -> Result<Vec<RawTrade>, SourceError> {
    let mut rows = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<StringRecord>());

    let headers = rows.next().ok_or(SourceError::EmptyWorkbook)?;
    let columns = ColumnMap::resolve(&headers)?;
    debug!(?columns, "resolved workbook columns");

    Ok(columns.raw_trades(rows, data_source))
}

/// Render a workbook cell the way the CSV export would have written it.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(|datetime| datetime.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

#[async_trait]
impl TradeSource for SpreadsheetSource {
    fn data_source(&self) -> DataSource {
        DataSource::SPREADSHEET
    }

    /// Exports are always read whole; the store's idempotent merge drops what it already has.
    async fn fetch_trades(&self, _: Option<NaiveDateTime>) -> Result<FetchOutcome, SourceError> {
        self.read().map(FetchOutcome::complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_asset() {
        struct TestCase {
            input: &'static str,
            expected: (&'static str, Option<&'static str>),
        }

        let cases = vec![
            TestCase { input: "0.1BTC", expected: ("0.1", Some("BTC")) },
            TestCase { input: "4,500.00 USDT", expected: ("4,500.00", Some("USDT")) },
            TestCase { input: "45000", expected: ("45000", None) },
            TestCase { input: "0.0001bnb", expected: ("0.0001", Some("BNB")) },
            TestCase { input: "", expected: ("", None) },
            // TC5: scientific notation is a number, not an asset code
            TestCase { input: "1E-5", expected: ("1E-5", None) },
            TestCase { input: "2.5e3", expected: ("2.5e3", None) },
            TestCase { input: "1E-5BTC", expected: ("1E-5", Some("BTC")) },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let (number, asset) = split_asset(test.input);
            assert_eq!(
                (number.as_str(), asset.as_deref()),
                test.expected,
                "TC{} failed",
                index
            );
        }
    }

    #[test]
    fn test_parse_english_export() {
        let csv = "\u{feff}Date(UTC),Pair,Side,Price,Executed,Amount,Fee\n\
                   2024-01-15 10:30:00,BTCUSDT,BUY,45000,0.1BTC,4500USDT,0.0001BNB\n\
                   ,,,,,,\n\
                   2024-01-17 12:00:00,BTCFDUSD,SELL,47000,0.1BTC,4700FDUSD,4.7FDUSD\n";

        let trades = parse_trades(csv.as_bytes(), &DataSource::SPREADSHEET).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(
            trades[0],
            RawTrade {
                timestamp: "2024-01-15 10:30:00".to_owned(),
                symbol: "BTCUSDT".to_owned(),
                side: "BUY".to_owned(),
                price: "45000".to_owned(),
                quantity: "0.1".to_owned(),
                quote_quantity: "4500".to_owned(),
                fee: Some("0.0001".to_owned()),
                fee_currency: Some("BNB".to_owned()),
                data_source: Some("spreadsheet".to_owned()),
            }
        );
        assert_eq!(trades[1].fee_currency.as_deref(), Some("FDUSD"));
    }

    #[test]
    fn test_parse_chinese_export() {
        let csv = "时间,交易对,类型,价格,数量,成交额,手续费,手续费结算币种\n\
                   2024-01-15 10:30:00,ETHUSDT,SELL,2500,1,2500,2.5,USDT\n";

        let trades = parse_trades(csv.as_bytes(), &DataSource::SPREADSHEET).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].symbol, "ETHUSDT");
        assert_eq!(trades[0].side, "SELL");
        assert_eq!(trades[0].quote_quantity, "2500");
        assert_eq!(trades[0].fee.as_deref(), Some("2.5"));
        assert_eq!(trades[0].fee_currency.as_deref(), Some("USDT"));
    }

    #[test]
    fn test_missing_column() {
        let csv = "Date(UTC),Pair,Side,Price,Executed\n2024-01-15 10:30:00,BTCUSDT,BUY,1,1\n";
        let result = parse_trades(csv.as_bytes(), &DataSource::SPREADSHEET);
        assert!(matches!(result, Err(SourceError::MissingColumn("amount"))));
    }

    #[test]
    fn test_parse_scientific_quantity() {
        let csv = "Date(UTC),Pair,Side,Price,Executed,Amount,Fee\n\
                   2024-01-15 10:30:00,BTCUSDT,BUY,45000,1E-5,0.45,0\n";

        let trades = parse_trades(csv.as_bytes(), &DataSource::SPREADSHEET).unwrap();
        assert_eq!(trades[0].quantity, "1E-5");
        assert_eq!(trades[0].quote_quantity, "0.45");
    }

    #[test]
    fn test_parse_workbook_range() {
        let rows = vec![
            vec![
                Data::String("Date(UTC)".to_owned()),
                Data::String("Pair".to_owned()),
                Data::String("Side".to_owned()),
                Data::String("Price".to_owned()),
                Data::String("Executed".to_owned()),
                Data::String("Amount".to_owned()),
                Data::String("Fee".to_owned()),
            ],
            vec![
                Data::DateTimeIso("2024-01-15T10:30:00".to_owned()),
                Data::String("BTCUSDT".to_owned()),
                Data::String("SELL".to_owned()),
                Data::Float(47000.0),
                Data::String("0.1BTC".to_owned()),
                Data::Float(4700.5),
                Data::String("4.7USDT".to_owned()),
            ],
            vec![Data::Empty; 7],
        ];

        let mut range = Range::new((0, 0), (rows.len() as u32 - 1, 6));
        for (row_index, row) in rows.into_iter().enumerate() {
            for (column_index, value) in row.into_iter().enumerate() {
                range.set_value((row_index as u32, column_index as u32), value);
            }
        }

        let trades = parse_range(&range, &DataSource::SPREADSHEET).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].timestamp, "2024-01-15 10:30:00");
        assert_eq!(trades[0].price, "47000");
        assert_eq!(trades[0].quantity, "0.1");
        assert_eq!(trades[0].quote_quantity, "4700.5");
        assert_eq!(trades[0].fee.as_deref(), Some("4.7"));
        assert_eq!(trades[0].fee_currency.as_deref(), Some("USDT"));
    }

    #[test]
    fn test_parse_workbook_missing_column() {
        let mut range = Range::new((0, 0), (0, 1));
        range.set_value((0, 0), Data::String("Pair".to_owned()));
        range.set_value((0, 1), Data::String("Side".to_owned()));

        let result = parse_range(&range, &DataSource::SPREADSHEET);
        assert!(matches!(result, Err(SourceError::MissingColumn("time"))));
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        struct TestCase {
            path: &'static str,
            workbook: bool,
        }

        let tests = vec![
            TestCase { path: "/nonexistent/trades.csv", workbook: false },
            TestCase { path: "/nonexistent/trades.XLSX", workbook: true },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let source = SpreadsheetSource::new(test.path);
            assert_eq!(source.data_source(), DataSource::SPREADSHEET, "TC{} failed", index);
            assert_eq!(source.is_workbook(), test.workbook, "TC{} failed", index);

            let result = source.fetch_trades(None).await;
            let expected_kind = if test.workbook {
                matches!(result, Err(SourceError::Workbook(_)))
            } else {
                matches!(result, Err(SourceError::Io(_)))
            };
            assert!(expected_kind, "TC{} failed", index);
        }
    }
}
