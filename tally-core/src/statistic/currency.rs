use std::collections::BTreeMap;

use prettytable::{row, Row, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_model::{deserialization::TIMESTAMP_FORMAT, enums::Side, instruments::SymbolNormalizer, trade::Trade};

use crate::{accounting::cost_basis::LedgerStep, model::accounting_error::AccountingError};

use super::summary::{checked_sum, combine, percent, ratio, TableBuilder};

/// Activity and realized result of one base currency across every pair it traded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyReport {
    pub currency: String,
    pub total_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub buy_quantity: Decimal,
    pub buy_amount: Decimal,
    pub sell_quantity: Decimal,
    pub sell_amount: Decimal,
    pub current_holding: Decimal,
    pub total_pnl: Decimal,
    pub win_rate: Decimal,
    /// Buy notional over buy quantity, only while something is still held.
    pub average_cost: Option<Decimal>,
}

impl CurrencyReport {
    pub fn generate(
        trades: &[Trade],
        base_currency: &str,
        normalizer: &SymbolNormalizer,
    ) -> Result<Self, AccountingError> {
        let currency = base_currency.trim().to_uppercase();
        let trades = trades
            .iter()
            .filter(|trade| normalizer.base_currency(&trade.symbol).eq_ignore_ascii_case(&currency))
            .collect::<Vec<_>>();

        let (buys, sells): (Vec<&Trade>, Vec<&Trade>) = trades.iter().copied().partition(|trade| trade.side == Side::Buy);
        let buy_quantity = checked_sum("bought quantity", buys.iter().map(|trade| trade.quantity))?;
        let buy_amount = checked_sum("buy amount", buys.iter().map(|trade| trade.quote_quantity))?;
        let sell_quantity = checked_sum("sold quantity", sells.iter().map(|trade| trade.quantity))?;
        let current_holding = buy_quantity
            .checked_sub(sell_quantity)
            .ok_or(AccountingError::TotalOverflow { field: "holding" })?;

        let settled = sells.iter().filter_map(|trade| trade.pnl).collect::<Vec<_>>();
        let profitable = settled.iter().filter(|pnl| **pnl > Decimal::ZERO).count();
        let average_cost = if current_holding > Decimal::ZERO && !buy_quantity.is_zero() {
            Some(ratio("average cost", buy_amount, buy_quantity)?)
        } else {
            None
        };

        Ok(Self {
            total_trades: trades.len(),
            buy_trades: buys.len(),
            sell_trades: sells.len(),
            buy_quantity,
            buy_amount,
            sell_quantity,
            sell_amount: checked_sum("sell amount", sells.iter().map(|trade| trade.quote_quantity))?,
            current_holding,
            total_pnl: checked_sum("pnl", trades.iter().filter_map(|trade| trade.pnl))?,
            win_rate: ratio("win rate", Decimal::from(profitable), Decimal::from(settled.len()))?,
            average_cost,
            currency,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.total_trades == 0
    }
}

impl TableBuilder for CurrencyReport {
    fn titles(&self) -> Row {
        row![
            "Trades",
            "Buys",
            "Sells",
            "Bought",
            "Buy Amount",
            "Sold",
            "Sell Amount",
            "Holding",
            "Avg Cost",
            "Total PnL",
            "Win Rate"
        ]
    }

    fn row(&self) -> Row {
        row![
            self.total_trades,
            self.buy_trades,
            self.sell_trades,
            self.buy_quantity.normalize(),
            format!("{:.2}", self.buy_amount),
            self.sell_quantity.normalize(),
            format!("{:.2}", self.sell_amount),
            self.current_holding.normalize(),
            self.average_cost
                .map(|cost| format!("{:.4}", cost))
                .unwrap_or_else(|| "-".to_owned()),
            format!("{:.2}", self.total_pnl),
            percent(self.win_rate)
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrencyEntry {
    pub currency: String,
    pub trades: usize,
    pub pnl: Decimal,
}

impl TableBuilder for CurrencyEntry {
    fn titles(&self) -> Row {
        row!["Trades", "Total PnL"]
    }

    fn row(&self) -> Row {
        row![self.trades, format!("{:.2}", self.pnl)]
    }
}

/// Every base currency with its trade count and realized pnl, best result first.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CurrencyListing {
    pub entries: Vec<CurrencyEntry>,
}

impl CurrencyListing {
    pub fn generate(trades: &[Trade], normalizer: &SymbolNormalizer) -> Result<Self, AccountingError> {
        let mut by_currency = BTreeMap::<String, (usize, Decimal)>::new();
        for trade in trades {
            let entry = by_currency
                .entry(normalizer.base_currency(&trade.symbol))
                .or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 = entry
                .1
                .checked_add(trade.pnl.unwrap_or_default())
                .ok_or(AccountingError::TotalOverflow { field: "pnl" })?;
        }

        let mut entries = by_currency
            .into_iter()
            .map(|(currency, (trades, pnl))| CurrencyEntry { currency, trades, pnl })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| b.pnl.cmp(&a.pnl).then_with(|| a.currency.cmp(&b.currency)));

        Ok(Self { entries })
    }

    pub fn table(&self) -> Table {
        combine(
            self.entries
                .iter()
                .map(|entry| (entry.currency.clone(), entry.clone())),
        )
    }
}

impl TableBuilder for LedgerStep {
    fn titles(&self) -> Row {
        row![
            "Time",
            "Symbol",
            "Side",
            "Price",
            "Quantity",
            "Amount",
            "Fee",
            "PnL",
            "Holding",
            "Avg Cost"
        ]
    }

    fn row(&self) -> Row {
        row![
            self.trade.timestamp.format(TIMESTAMP_FORMAT),
            self.trade.symbol,
            self.trade.side,
            self.trade.price.normalize(),
            self.trade.quantity.normalize(),
            format!("{:.2}", self.trade.quote_quantity),
            format!("{} {}", self.trade.fee.normalize(), self.trade.fee_currency),
            format!("{:.2}", self.pnl),
            self.position.quantity.normalize(),
            format!("{:.4}", self.position.average_cost)
        ]
    }
}

/// Per-trade detail of one currency, numbered in replay order.
pub fn ledger_table(steps: &[LedgerStep]) -> Table {
    combine(
        steps
            .iter()
            .enumerate()
            .map(|(index, step)| ((index + 1).to_string(), step.clone())),
    )
}

impl TableBuilder for Trade {
    fn titles(&self) -> Row {
        row!["Time", "Symbol", "Quote", "Side", "Price", "Quantity", "Amount", "Fee", "PnL", "Source"]
    }

    fn row(&self) -> Row {
        row![
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.symbol,
            self.original_quote_currency,
            self.side,
            self.price.normalize(),
            self.quantity.normalize(),
            format!("{:.2}", self.quote_quantity),
            format!("{} {}", self.fee.normalize(), self.fee_currency),
            self.pnl.map_or_else(|| "-".to_owned(), |pnl| format!("{:.2}", pnl)),
            self.data_source
        ]
    }
}

/// Stored trades keyed by fingerprint.
pub fn trade_table(trades: &[Trade]) -> Table {
    combine(trades.iter().map(|trade| (trade.id.to_string(), trade.clone())))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal_macros::dec;
    use tally_model::identifiers::{DataSource, TradeId};

    use super::*;

    fn trade(id: &str, symbol: &str, side: Side, quantity: Decimal, amount: Decimal, pnl: Option<Decimal>) -> Trade {
        let timestamp: NaiveDateTime = NaiveDate::from_ymd_opt(2024, 2, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap();
        Trade {
            id: TradeId::from(id),
            timestamp,
            symbol: symbol.to_owned(),
            original_symbol: symbol.to_owned(),
            original_quote_currency: "USDT".to_owned(),
            side,
            price: amount / quantity,
            quantity,
            quote_quantity: amount,
            fee: Decimal::ZERO,
            fee_currency: "USDT".to_owned(),
            pnl,
            data_source: DataSource::TEST,
            sequence: 0,
        }
    }

    fn book() -> Vec<Trade> {
        vec![
            trade("a", "XRPUSDT", Side::Buy, dec!(100), dec!(50), Some(Decimal::ZERO)),
            trade("b", "XRPUSDT", Side::Buy, dec!(100), dec!(70), Some(Decimal::ZERO)),
            trade("c", "XRPUSDT", Side::Sell, dec!(50), dec!(40), Some(dec!(10))),
            trade("d", "XRPUSDT", Side::Sell, dec!(50), dec!(25), Some(dec!(-5))),
            trade("e", "ETHUSDT", Side::Buy, dec!(1), dec!(3000), Some(Decimal::ZERO)),
            trade("f", "ETHUSDT", Side::Sell, dec!(1), dec!(3100), Some(dec!(100))),
            trade("g", "SOLBTC", Side::Buy, dec!(10), dec!(0.02), None),
        ]
    }

    #[test]
    fn test_currency_report_generate() {
        let report = CurrencyReport::generate(&book(), "xrp", &SymbolNormalizer::default()).unwrap();

        assert_eq!(report.currency, "XRP");
        assert_eq!((report.total_trades, report.buy_trades, report.sell_trades), (4, 2, 2));
        assert_eq!(report.buy_quantity, dec!(200));
        assert_eq!(report.buy_amount, dec!(120));
        assert_eq!(report.sell_quantity, dec!(100));
        assert_eq!(report.sell_amount, dec!(65));
        assert_eq!(report.current_holding, dec!(100));
        assert_eq!(report.total_pnl, dec!(5));
        assert_eq!(report.win_rate, dec!(0.5));
        assert_eq!(report.average_cost, Some(dec!(0.6)));
    }

    #[test]
    fn test_currency_report_closed_and_unknown() {
        let normalizer = SymbolNormalizer::default();

        let eth = CurrencyReport::generate(&book(), "ETH", &normalizer).unwrap();
        assert_eq!(eth.current_holding, Decimal::ZERO);
        assert_eq!(eth.average_cost, None);
        assert_eq!(eth.win_rate, Decimal::ONE);

        let doge = CurrencyReport::generate(&book(), "DOGE", &normalizer).unwrap();
        assert!(doge.is_empty());
        assert_eq!(doge.win_rate, Decimal::ZERO);
    }

    #[test]
    fn test_currency_listing_sorted_by_pnl() {
        let listing = CurrencyListing::generate(&book(), &SymbolNormalizer::default()).unwrap();
        let order = listing
            .entries
            .iter()
            .map(|entry| (entry.currency.as_str(), entry.trades))
            .collect::<Vec<_>>();

        assert_eq!(order, vec![("ETH", 2), ("XRP", 4), ("SOL", 1)]);
        assert_eq!(listing.table().len(), 3);
    }

    #[test]
    fn test_trade_table_marks_unreplayed_pnl() {
        let trades = book();
        let table = trade_table(&trades);

        assert_eq!(table.len(), trades.len());
        assert_eq!(trades[6].row().get_cell(8).map(|cell| cell.get_content()), Some("-".to_owned()));
        assert_eq!(trades[2].row().get_cell(8).map(|cell| cell.get_content()), Some("10.00".to_owned()));
    }

    #[test]
    fn test_currency_totals_overflow_is_an_error() {
        let normalizer = SymbolNormalizer::default();
        let mut trades = book();
        trades.push(trade("h", "XRPUSDT", Side::Buy, Decimal::MAX, Decimal::MAX, Some(Decimal::MAX)));

        assert_eq!(
            CurrencyReport::generate(&trades, "XRP", &normalizer),
            Err(AccountingError::TotalOverflow { field: "bought quantity" })
        );
        assert_eq!(
            CurrencyListing::generate(&trades, &normalizer),
            Err(AccountingError::TotalOverflow { field: "pnl" })
        );
    }
}
