//! Execution collaborator port.
//!
//! Decisions are submitted here; position state only advances on a [`Fill`].

use chrono::NaiveDateTime;

use crate::domain::decision::TradeDecision;
use crate::domain::error::{Rejection, SigtraderError};
use crate::domain::portfolio::Portfolio;

/// A decision addressed to one instrument at one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    /// Reference price (the bar close).
    pub price: f64,
    pub decision: TradeDecision,
}

/// Confirmation that an order executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
}

/// The collaborator's view of an open position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
    pub size: f64,
    pub entry_price: f64,
}

pub trait ExecutionPort {
    fn available_cash(&self) -> Result<f64, SigtraderError>;

    /// `None` when flat.
    fn current_position(&self, symbol: &str) -> Result<Option<PositionReport>, SigtraderError>;

    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection>;

    /// New market price for `symbol`. Used to mark positions and trigger
    /// resting orders.
    fn on_price(&mut self, _symbol: &str, _timestamp: NaiveDateTime, _price: f64) {}
}

/// An execution collaborator that keeps its own ledger, used by the backtest.
pub trait SimulatedAccount: ExecutionPort {
    fn portfolio(&self) -> &Portfolio;

    /// Mark holdings at the latest prices and append an equity point.
    fn record_equity(&mut self, timestamp: NaiveDateTime);
}
