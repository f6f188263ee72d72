use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_model::{enums::Side, identifiers::TradeId, instruments::SymbolNormalizer, trade::Trade};
use tracing::warn;

use crate::model::accounting_error::AccountingError;

/// Realized PnL per trade of one symbol, as produced by a replay.
pub type PnlMap = HashMap<TradeId, Decimal>;

/// Running position of one symbol under weighted-average-cost accounting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CostBasis {
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

impl CostBasis {
    pub fn is_open(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}

/// One row of a replay: the trade, the PnL it realized and the position right after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerStep {
    pub trade: Trade,
    pub pnl: Decimal,
    pub position: CostBasis,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Replay {
    pub pnl: PnlMap,
    pub position: CostBasis,
}

/// Replays a symbol's history in `(timestamp, sequence)` order. Pure: the same trades
/// always produce the same [`Replay`], whatever order they are handed over in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CostBasisEngine {
    normalizer: SymbolNormalizer,
}

impl CostBasisEngine {
    pub fn new(normalizer: SymbolNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn replay(&self, trades: &[Trade]) -> Result<Replay, AccountingError> {
        let mut replay = Replay::default();
        for trade in chronological(trades) {
            let pnl = self.apply(&mut replay.position, trade)?;
            replay.pnl.insert(trade.id.clone(), pnl);
        }
        Ok(replay)
    }

    pub fn replay_detailed(&self, trades: &[Trade]) -> Result<Vec<LedgerStep>, AccountingError> {
        let mut position = CostBasis::default();
        chronological(trades)
            .into_iter()
            .map(|trade| {
                let pnl = self.apply(&mut position, trade)?;
                Ok(LedgerStep {
                    trade: Trade {
                        pnl: Some(pnl),
                        ..trade.clone()
                    },
                    pnl,
                    position,
                })
            })
            .collect()
    }

    /// Advance `position` by one trade and return the PnL it realized. On overflow the
    /// position is left as it was before the trade.
    pub fn apply(&self, position: &mut CostBasis, trade: &Trade) -> Result<Decimal, AccountingError> {
        let overflow = || AccountingError::ReplayOverflow {
            trade_id: trade.id.clone(),
        };

        match trade.side {
            Side::Buy => {
                let quantity = position.quantity.checked_add(trade.quantity).ok_or_else(overflow)?;
                let average_cost = if position.is_open() {
                    position
                        .quantity
                        .checked_mul(position.average_cost)
                        .zip(trade.quantity.checked_mul(trade.price))
                        .and_then(|(held, bought)| held.checked_add(bought))
                        .and_then(|cost| cost.checked_div(quantity))
                        .ok_or_else(overflow)?
                } else {
                    trade.price
                };

                *position = CostBasis { quantity, average_cost };
                Ok(Decimal::ZERO)
            }
            Side::Sell if position.is_open() => {
                let fee = if self.normalizer.is_stable(&trade.fee_currency) {
                    trade.fee
                } else {
                    Decimal::ZERO
                };
                let pnl = trade
                    .price
                    .checked_sub(position.average_cost)
                    .and_then(|spread| spread.checked_mul(trade.quantity))
                    .and_then(|gross| gross.checked_sub(fee))
                    .ok_or_else(overflow)?;
                let quantity = position.quantity.checked_sub(trade.quantity).ok_or_else(overflow)?;

                position.quantity = quantity;
                if quantity < Decimal::ZERO {
                    warn!(
                        symbol = %trade.symbol,
                        trade_id = %trade.id,
                        quantity = %quantity,
                        "sell exceeded the open position, holding is now negative"
                    );
                }
                Ok(pnl)
            }
            Side::Sell => {
                warn!(
                    symbol = %trade.symbol,
                    trade_id = %trade.id,
                    quantity = %position.quantity,
                    "sell without an open position, realized pnl recorded as zero"
                );
                Ok(Decimal::ZERO)
            }
        }
    }
}

fn chronological(trades: &[Trade]) -> Vec<&Trade> {
    let mut ordered = trades.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|trade| trade.chronological_key());
    ordered
}
