//! Cash, holdings and equity ledger for simulated trading.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;

use super::position::ClosedTrade;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// A long holding in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_commission: f64,
}

impl Holding {
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub holdings: BTreeMap<String, Holding>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            holdings: BTreeMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn holding(&self, symbol: &str) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    pub fn has_holding(&self, symbol: &str) -> bool {
        self.holdings.contains_key(symbol)
    }

    /// Debit `quantity * entry_price + entry_commission` and book the holding.
    pub fn open(&mut self, symbol: &str, holding: Holding) {
        self.cash -= holding.market_value(holding.entry_price) + holding.entry_commission;
        self.holdings.insert(symbol.to_string(), holding);
    }

    /// Sell the whole holding at `price`, credit the proceeds and record the
    /// trade. `None` when nothing is held.
    pub fn close(
        &mut self,
        symbol: &str,
        price: f64,
        commission: f64,
        exit_time: NaiveDateTime,
    ) -> Option<ClosedTrade> {
        let holding = self.holdings.remove(symbol)?;
        self.cash += holding.market_value(price) - commission;
        let pnl = holding.quantity * (price - holding.entry_price)
            - holding.entry_commission
            - commission;
        let trade = ClosedTrade {
            symbol: symbol.to_string(),
            quantity: holding.quantity,
            entry_price: holding.entry_price,
            exit_price: price,
            entry_time: holding.entry_time,
            exit_time,
            pnl,
        };
        self.closed_trades.push(trade.clone());
        Some(trade)
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    /// Cash plus holdings marked at `prices`; holdings without a price are
    /// valued at entry.
    pub fn total_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .holdings
            .iter()
            .map(|(symbol, h)| {
                let price = prices.get(symbol).copied().unwrap_or(h.entry_price);
                h.market_value(price)
            })
            .sum();
        self.cash + position_value
    }
}
