//! Simulated execution: long-only fills at the bar close with a percentage
//! commission on both legs.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::domain::decision::TradeDecision;
use crate::domain::error::{Rejection, SigtraderError};
use crate::domain::portfolio::{Holding, Portfolio};
use crate::ports::execution_port::{
    ExecutionPort, Fill, OrderRequest, PositionReport, SimulatedAccount,
};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 10_000.0;
pub const DEFAULT_COMMISSION_PCT: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct SimulatedExecution {
    portfolio: Portfolio,
    /// Fraction of trade value, e.g. 0.001 for 0.1%.
    commission_pct: f64,
    last_prices: HashMap<String, f64>,
}

impl Default for SimulatedExecution {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CAPITAL, DEFAULT_COMMISSION_PCT)
    }
}

impl SimulatedExecution {
    pub fn new(initial_capital: f64, commission_pct: f64) -> Self {
        Self {
            portfolio: Portfolio::new(initial_capital),
            commission_pct,
            last_prices: HashMap::new(),
        }
    }

    pub fn commission(&self, trade_value: f64) -> f64 {
        trade_value * self.commission_pct
    }

    pub fn into_portfolio(self) -> Portfolio {
        self.portfolio
    }

    fn enter(&mut self, order: &OrderRequest, size: f64) -> Result<Fill, Rejection> {
        if !size.is_finite() || size <= 0.0 {
            return Err(Rejection::InvalidSize { size });
        }
        if self.portfolio.has_holding(&order.symbol) {
            return Err(Rejection::AlreadyOpen {
                symbol: order.symbol.clone(),
            });
        }
        let price = checked_price(order)?;
        let cost = size * price;
        let commission = self.commission(cost);
        let required = cost + commission;
        if required > self.portfolio.cash {
            return Err(Rejection::InsufficientCash {
                required,
                available: self.portfolio.cash,
            });
        }
        self.portfolio.open(
            &order.symbol,
            Holding {
                quantity: size,
                entry_price: price,
                entry_time: order.timestamp,
                entry_commission: commission,
            },
        );
        self.last_prices.insert(order.symbol.clone(), price);
        Ok(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            price,
            quantity: size,
            commission,
        })
    }

    fn exit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection> {
        let price = checked_price(order)?;
        let quantity = self
            .portfolio
            .holding(&order.symbol)
            .map(|h| h.quantity)
            .ok_or_else(|| Rejection::NoPosition {
                symbol: order.symbol.clone(),
            })?;
        let commission = self.commission(quantity * price);
        self.portfolio
            .close(&order.symbol, price, commission, order.timestamp)
            .ok_or_else(|| Rejection::NoPosition {
                symbol: order.symbol.clone(),
            })?;
        self.last_prices.insert(order.symbol.clone(), price);
        Ok(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            price,
            quantity,
            commission,
        })
    }
}

fn checked_price(order: &OrderRequest) -> Result<f64, Rejection> {
    if order.price.is_finite() && order.price > 0.0 {
        Ok(order.price)
    } else {
        Err(Rejection::NoPrice {
            symbol: order.symbol.clone(),
        })
    }
}

impl ExecutionPort for SimulatedExecution {
    fn available_cash(&self) -> Result<f64, SigtraderError> {
        Ok(self.portfolio.cash)
    }

    fn current_position(&self, symbol: &str) -> Result<Option<PositionReport>, SigtraderError> {
        Ok(self.portfolio.holding(symbol).map(|h| PositionReport {
            size: h.quantity,
            entry_price: h.entry_price,
        }))
    }

    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection> {
        match order.decision {
            TradeDecision::EnterLong { size, .. } => self.enter(order, size),
            TradeDecision::ExitLong { .. } => self.exit(order),
            TradeDecision::NoAction => Err(Rejection::InvalidSize { size: 0.0 }),
        }
    }

    fn on_price(&mut self, symbol: &str, _timestamp: NaiveDateTime, price: f64) {
        self.last_prices.insert(symbol.to_string(), price);
    }
}

impl SimulatedAccount for SimulatedExecution {
    fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    fn record_equity(&mut self, timestamp: NaiveDateTime) {
        let equity = self.portfolio.total_equity(&self.last_prices);
        self.portfolio.record_equity(timestamp, equity);
    }
}
