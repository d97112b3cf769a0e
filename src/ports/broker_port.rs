//! Broker (exchange account) port.

use chrono::NaiveDateTime;

use crate::domain::error::SigtraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Balance {
    pub asset: String,
    pub free: f64,
    pub locked: f64,
}

impl Balance {
    pub fn total(&self) -> f64 {
        self.free + self.locked
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerFill {
    pub order_id: u64,
    pub side: OrderSide,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
}

pub trait BrokerGateway {
    fn balances(&self) -> Result<Vec<Balance>, SigtraderError>;

    fn free_balance(&self, asset: &str) -> Result<f64, SigtraderError>;

    /// Base-asset quantity currently held for `symbol`.
    fn position_size(&self, symbol: &str) -> Result<f64, SigtraderError>;

    fn last_price(&self, symbol: &str) -> Result<Option<f64>, SigtraderError>;

    fn place_market_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<BrokerFill, SigtraderError>;

    /// One-cancels-other sell bracket: a stop below and a limit above.
    /// Returns the bracket id.
    fn place_bracket_order(
        &mut self,
        symbol: &str,
        quantity: f64,
        stop_price: f64,
        take_profit_price: f64,
    ) -> Result<u64, SigtraderError>;

    /// Returns the number of cancelled orders.
    fn cancel_open_orders(&mut self, symbol: &str) -> Result<usize, SigtraderError>;

    fn on_price(&mut self, _symbol: &str, _timestamp: NaiveDateTime, _price: f64) {}
}
