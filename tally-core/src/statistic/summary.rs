use std::fmt::{self, Display};

use chrono::{Duration, NaiveDateTime};
use prettytable::{row, Cell, Row, Table};
use rust_decimal::Decimal;
use serde::Serialize;
use tally_model::{deserialization::TIMESTAMP_FORMAT, enums::Side, instruments::SymbolNormalizer, trade::Trade};

use crate::{journal::repository::TradeFilter, model::accounting_error::AccountingError};

pub trait TableBuilder {
    fn titles(&self) -> Row;
    fn row(&self) -> Row;

    fn table(&self, id_cell: &str) -> Table {
        let mut table = Table::new();

        let mut titles = self.titles();
        titles.insert_cell(0, Cell::new(""));
        table.set_titles(titles);

        let mut row = self.row();
        row.insert_cell(0, Cell::new(id_cell));
        table.add_row(row);

        table
    }
}

/// Stack several builders of one kind into a single table, one row per `(id, builder)`.
pub fn combine<Iter, T>(builders: Iter) -> Table
where
    Iter: IntoIterator<Item = (String, T)>,
    T: TableBuilder,
{
    builders
        .into_iter()
        .enumerate()
        .fold(Table::new(), |mut table, (index, (id, builder))| {
            if index == 0 {
                let mut titles = builder.titles();
                titles.insert_cell(0, Cell::new(""));
                table.set_titles(titles);
            }

            let mut row = builder.row();
            row.insert_cell(0, Cell::new(&id));
            table.add_row(row);
            table
        })
}

pub(crate) fn percent(fraction: Decimal) -> String {
    fraction
        .checked_mul(Decimal::ONE_HUNDRED)
        .map_or_else(|| "-".to_owned(), |percent| format!("{:.2}%", percent))
}

/// Zero when `denominator` is zero.
pub(crate) fn ratio(field: &'static str, numerator: Decimal, denominator: Decimal) -> Result<Decimal, AccountingError> {
    if denominator.is_zero() {
        Ok(Decimal::ZERO)
    } else {
        numerator
            .checked_div(denominator)
            .ok_or(AccountingError::TotalOverflow { field })
    }
}

pub(crate) fn checked_sum<Values>(field: &'static str, values: Values) -> Result<Decimal, AccountingError>
where
    Values: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
        .ok_or(AccountingError::TotalOverflow { field })
}

/// Mean profit over mean absolute loss. Unbounded when there are winners and no losers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Ratio {
    Finite(Decimal),
    Infinite,
}

impl Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ratio::Finite(value) => write!(f, "{:.2}", value),
            Ratio::Infinite => write!(f, "inf"),
        }
    }
}

/// Selects the trades a [`PortfolioSummary`] is generated over.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PortfolioFilter {
    pub since: Option<NaiveDateTime>,
    pub symbol: Option<String>,
    pub days: Option<u32>,
}

impl PortfolioFilter {
    /// Resolve into a store query. `days` is counted back from `now` and the later of the
    /// two lower bounds wins; the symbol is normalised like any ingested symbol.
    pub fn resolve(&self, now: NaiveDateTime, normalizer: &SymbolNormalizer) -> TradeFilter {
        let window = self.days.map(|days| now - Duration::days(i64::from(days)));
        let since = match (self.since, window) {
            (Some(since), Some(window)) => Some(since.max(window)),
            (since, window) => since.or(window),
        };

        TradeFilter {
            since,
            symbol: self.symbol.as_deref().map(|symbol| normalizer.normalize(symbol)),
            side: None,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub total_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub total_fees: Decimal,
    pub total_pnl: Decimal,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: Decimal,
    pub average_profit: Decimal,
    pub average_loss: Decimal,
    pub profit_loss_ratio: Ratio,
    pub first_trade: Option<NaiveDateTime>,
    pub last_trade: Option<NaiveDateTime>,
}

impl PortfolioSummary {
    /// Roll up `trades`. Only fees paid in a stable unit are summed, since nothing else
    /// has a price in the ledger.
    pub fn generate(trades: &[Trade], normalizer: &SymbolNormalizer) -> Result<Self, AccountingError> {
        let (buys, sells): (Vec<&Trade>, Vec<&Trade>) = trades.iter().partition(|trade| trade.side == Side::Buy);
        let winners = trades.iter().filter(|trade| trade.is_winner()).filter_map(|trade| trade.pnl).collect::<Vec<_>>();
        let losers = trades.iter().filter(|trade| trade.is_loser()).filter_map(|trade| trade.pnl).collect::<Vec<_>>();

        let gross_profit = checked_sum("gross profit", winners.iter().copied())?;
        let gross_loss = checked_sum("gross loss", losers.iter().map(|loss| loss.abs()))?;
        let average_profit = ratio("average profit", gross_profit, Decimal::from(winners.len()))?;
        let average_loss = ratio("average loss", gross_loss, Decimal::from(losers.len()))?;

        let profit_loss_ratio = match (winners.is_empty(), losers.is_empty()) {
            (true, _) => Ratio::Finite(Decimal::ZERO),
            (false, true) => Ratio::Infinite,
            (false, false) => Ratio::Finite(ratio("profit/loss ratio", average_profit, average_loss)?),
        };

        Ok(Self {
            total_trades: trades.len(),
            buy_trades: buys.len(),
            sell_trades: sells.len(),
            buy_amount: checked_sum("buy amount", buys.iter().map(|trade| trade.quote_quantity))?,
            sell_amount: checked_sum("sell amount", sells.iter().map(|trade| trade.quote_quantity))?,
            total_fees: checked_sum(
                "fees",
                trades
                    .iter()
                    .filter(|trade| normalizer.is_stable(&trade.fee_currency))
                    .map(|trade| trade.fee),
            )?,
            total_pnl: checked_sum("pnl", trades.iter().filter_map(|trade| trade.pnl))?,
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            win_rate: ratio(
                "win rate",
                Decimal::from(winners.len()),
                Decimal::from(winners.len() + losers.len()),
            )?,
            average_profit,
            average_loss,
            profit_loss_ratio,
            first_trade: trades.iter().map(|trade| trade.timestamp).min(),
            last_trade: trades.iter().map(|trade| trade.timestamp).max(),
        })
    }
}

impl TableBuilder for PortfolioSummary {
    fn titles(&self) -> Row {
        row![
            "Trades",
            "Buys",
            "Sells",
            "Buy Amount",
            "Sell Amount",
            "Fees",
            "Total PnL",
            "Win Rate",
            "P/L Ratio",
            "From",
            "To"
        ]
    }

    fn row(&self) -> Row {
        let format_time = |timestamp: Option<NaiveDateTime>| {
            timestamp
                .map(|timestamp| timestamp.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_else(|| "-".to_owned())
        };

        row![
            self.total_trades,
            self.buy_trades,
            self.sell_trades,
            format!("{:.2}", self.buy_amount),
            format!("{:.2}", self.sell_amount),
            format!("{:.4}", self.total_fees),
            format!("{:.2}", self.total_pnl),
            percent(self.win_rate),
            self.profit_loss_ratio,
            format_time(self.first_trade),
            format_time(self.last_trade)
        ]
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tally_model::identifiers::{DataSource, TradeId};

    use super::*;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn trade(day: u32, side: Side, pnl: Option<Decimal>) -> Trade {
        Trade {
            id: TradeId::from(format!("{day:016}")),
            timestamp: at(day),
            symbol: "BTCUSDT".to_owned(),
            original_symbol: "BTCUSDT".to_owned(),
            original_quote_currency: "USDT".to_owned(),
            side,
            price: dec!(10),
            quantity: dec!(1),
            quote_quantity: dec!(10),
            fee: dec!(0.5),
            fee_currency: if day % 2 == 0 { "USDT" } else { "BNB" }.to_owned(),
            pnl,
            data_source: DataSource::TEST,
            sequence: u64::from(day),
        }
    }

    #[test]
    fn test_portfolio_summary_generate() {
        let trades = vec![
            trade(1, Side::Buy, Some(Decimal::ZERO)),
            trade(2, Side::Sell, Some(dec!(30))),
            trade(3, Side::Sell, Some(dec!(10))),
            trade(4, Side::Sell, Some(dec!(-5))),
        ];

        let summary = PortfolioSummary::generate(&trades, &SymbolNormalizer::default()).unwrap();
        assert_eq!(summary.total_trades, 4);
        assert_eq!((summary.buy_trades, summary.sell_trades), (1, 3));
        assert_eq!(summary.buy_amount, dec!(10));
        assert_eq!(summary.sell_amount, dec!(30));
        assert_eq!(summary.total_fees, dec!(1.0));
        assert_eq!(summary.total_pnl, dec!(35));
        assert_eq!(summary.win_rate.round_dp(4), dec!(0.6667));
        assert_eq!(summary.average_profit, dec!(20));
        assert_eq!(summary.average_loss, dec!(5));
        assert_eq!(summary.profit_loss_ratio, Ratio::Finite(dec!(4)));
        assert_eq!(summary.first_trade, Some(at(1)));
        assert_eq!(summary.last_trade, Some(at(4)));
    }

    #[test]
    fn test_profit_loss_ratio_edges() {
        struct TestCase {
            pnl: Vec<Decimal>,
            expected: Ratio,
        }

        let cases = vec![
            TestCase { pnl: vec![dec!(5), dec!(7)], expected: Ratio::Infinite },
            TestCase { pnl: vec![dec!(-5)], expected: Ratio::Finite(Decimal::ZERO) },
            TestCase { pnl: vec![], expected: Ratio::Finite(Decimal::ZERO) },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let trades = test
                .pnl
                .into_iter()
                .enumerate()
                .map(|(day, pnl)| trade(day as u32 + 1, Side::Sell, Some(pnl)))
                .collect::<Vec<_>>();
            let summary = PortfolioSummary::generate(&trades, &SymbolNormalizer::default()).unwrap();
            assert_eq!(summary.profit_loss_ratio, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_portfolio_filter_resolve() {
        let normalizer = SymbolNormalizer::default();
        let now = at(20);

        let filter = PortfolioFilter {
            since: Some(at(1)),
            symbol: Some("btc/fdusd".to_owned()),
            days: Some(7),
        };
        let resolved = filter.resolve(now, &normalizer);
        assert_eq!(resolved.since, Some(at(13)));
        assert_eq!(resolved.symbol.as_deref(), Some("BTCUSDT"));

        let unbounded = PortfolioFilter::default().resolve(now, &normalizer);
        assert_eq!(unbounded, TradeFilter::default());
    }

    #[test]
    fn test_summary_table_has_one_row() {
        let summary = PortfolioSummary::generate(&[trade(2, Side::Sell, Some(dec!(1)))], &SymbolNormalizer::default()).unwrap();
        let table = summary.table("Total");
        assert_eq!(table.len(), 1);
        assert_eq!(Ratio::Infinite.to_string(), "inf");
    }

    #[test]
    fn test_portfolio_summary_overflow_is_an_error() {
        let whale = Trade {
            quote_quantity: Decimal::MAX,
            ..trade(1, Side::Buy, None)
        };
        let trades = vec![whale.clone(), Trade { timestamp: at(2), ..whale }];

        let actual = PortfolioSummary::generate(&trades, &SymbolNormalizer::default());
        assert_eq!(actual, Err(AccountingError::TotalOverflow { field: "buy amount" }));
    }
}
