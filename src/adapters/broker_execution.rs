//! Routes trade decisions to a [`BrokerGateway`].
//!
//! An entry is a market buy followed by an OCO sell bracket around the fill
//! price; an exit cancels the bracket and sells the whole position. A sell
//! that fails puts the bracket back. The broker's reported quantity is the
//! position of record.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::{error, warn};

use crate::domain::decision::TradeDecision;
use crate::domain::error::{Rejection, SigtraderError};
use crate::ports::broker_port::{BrokerGateway, OrderSide};
use crate::ports::execution_port::{ExecutionPort, Fill, OrderRequest, PositionReport};

/// Quantities at or below this are treated as no position.
const DUST: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BracketConfig {
    /// Fallback stop distance below the fill, as a fraction of it, when the
    /// decision carries no stop.
    pub stop_pct: f64,
    pub take_profit_pct: f64,
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            stop_pct: 0.02,
            take_profit_pct: 0.02,
        }
    }
}

impl BracketConfig {
    /// Stop and take-profit prices around `fill_price`.
    pub fn prices(&self, fill_price: f64, stop_distance: Option<f64>) -> (f64, f64) {
        let stop = fill_price - stop_distance.unwrap_or(fill_price * self.stop_pct);
        (stop, fill_price * (1.0 + self.take_profit_pct))
    }
}

/// What was placed around an entry fill.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Protection {
    entry_price: f64,
    stop: f64,
    take_profit: f64,
}

pub struct BrokerExecution<B: BrokerGateway> {
    broker: B,
    quote_asset: String,
    bracket: BracketConfig,
    protections: HashMap<String, Protection>,
}

impl<B: BrokerGateway> BrokerExecution<B> {
    pub fn new(broker: B, quote_asset: impl Into<String>, bracket: BracketConfig) -> Self {
        Self {
            broker,
            quote_asset: quote_asset.into(),
            bracket,
            protections: HashMap::new(),
        }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    fn enter(
        &mut self,
        order: &OrderRequest,
        size: f64,
        stop_distance: Option<f64>,
    ) -> Result<Fill, Rejection> {
        if !size.is_finite() || size <= 0.0 {
            return Err(Rejection::InvalidSize { size });
        }
        let fill = self
            .broker
            .place_market_order(&order.symbol, OrderSide::Buy, size)
            .map_err(exchange_rejection)?;

        let (stop, take_profit) = self.bracket.prices(fill.price, stop_distance);
        if let Err(e) =
            self.broker
                .place_bracket_order(&order.symbol, fill.quantity, stop, take_profit)
        {
            warn!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                stop,
                take_profit,
                error = %e,
                "bracket order failed, position is unprotected"
            );
        }

        self.protections.insert(
            order.symbol.clone(),
            Protection {
                entry_price: fill.price,
                stop,
                take_profit,
            },
        );
        Ok(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            price: fill.price,
            quantity: fill.quantity,
            commission: fill.commission,
        })
    }

    fn exit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection> {
        self.broker
            .cancel_open_orders(&order.symbol)
            .map_err(exchange_rejection)?;
        let quantity = self
            .broker
            .position_size(&order.symbol)
            .map_err(exchange_rejection)?;
        if quantity <= DUST {
            return Err(Rejection::NoPosition {
                symbol: order.symbol.clone(),
            });
        }
        let fill = match self
            .broker
            .place_market_order(&order.symbol, OrderSide::Sell, quantity)
        {
            Ok(fill) => fill,
            Err(e) => {
                self.restore_bracket(order, quantity);
                return Err(exchange_rejection(e));
            }
        };
        self.protections.remove(&order.symbol);
        Ok(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            price: fill.price,
            quantity: fill.quantity,
            commission: fill.commission,
        })
    }
}

impl<B: BrokerGateway> BrokerExecution<B> {
    /// Re-arm the bracket cancelled by an exit whose sell failed.
    fn restore_bracket(&mut self, order: &OrderRequest, quantity: f64) {
        let Some(p) = self.protections.get(&order.symbol).copied() else {
            error!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                "exit failed and no bracket is known, position is unprotected"
            );
            return;
        };
        match self
            .broker
            .place_bracket_order(&order.symbol, quantity, p.stop, p.take_profit)
        {
            Ok(_) => warn!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                stop = p.stop,
                take_profit = p.take_profit,
                "exit failed, bracket restored"
            ),
            Err(e) => error!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                error = %e,
                "exit failed and bracket could not be restored, position is unprotected"
            ),
        }
    }
}

fn exchange_rejection(err: SigtraderError) -> Rejection {
    Rejection::Exchange {
        reason: err.to_string(),
    }
}

impl<B: BrokerGateway> ExecutionPort for BrokerExecution<B> {
    fn available_cash(&self) -> Result<f64, SigtraderError> {
        self.broker.free_balance(&self.quote_asset)
    }

    fn current_position(&self, symbol: &str) -> Result<Option<PositionReport>, SigtraderError> {
        let size = self.broker.position_size(symbol)?;
        if size <= DUST {
            return Ok(None);
        }
        let entry_price = match self.protections.get(symbol) {
            Some(p) => p.entry_price,
            None => self.broker.last_price(symbol)?.ok_or_else(|| SigtraderError::Broker {
                reason: format!("{symbol}: holding {size} with no known price"),
            })?,
        };
        Ok(Some(PositionReport { size, entry_price }))
    }

    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection> {
        match order.decision {
            TradeDecision::EnterLong {
                size,
                stop_distance,
            } => self.enter(order, size, stop_distance),
            TradeDecision::ExitLong { .. } => self.exit(order),
            TradeDecision::NoAction => Err(Rejection::InvalidSize { size: 0.0 }),
        }
    }

    fn on_price(&mut self, symbol: &str, timestamp: NaiveDateTime, price: f64) {
        self.broker.on_price(symbol, timestamp, price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper_broker::PaperBroker;
    use crate::domain::decision::ExitReason;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn execution() -> BrokerExecution<PaperBroker> {
        let mut exec =
            BrokerExecution::new(PaperBroker::new("USDT", 1_000.0, 0.0), "USDT", BracketConfig::default());
        exec.on_price("BTCUSDT", ts(), 100.0);
        exec
    }

    fn order(decision: TradeDecision) -> OrderRequest {
        OrderRequest {
            symbol: "BTCUSDT".into(),
            timestamp: ts(),
            price: 100.0,
            decision,
        }
    }

    #[test]
    fn bracket_prices_default_to_percentages() {
        let (stop, tp) = BracketConfig::default().prices(100.0, None);
        assert!((stop - 98.0).abs() < 1e-9);
        assert!((tp - 102.0).abs() < 1e-9);
        let (stop, _) = BracketConfig::default().prices(100.0, Some(10.0));
        assert!((stop - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn entry_places_bracket() {
        let mut exec = execution();
        let fill = exec
            .submit(&order(TradeDecision::EnterLong {
                size: 2.0,
                stop_distance: Some(5.0),
            }))
            .unwrap();
        assert!((fill.quantity - 2.0).abs() < f64::EPSILON);
        assert_eq!(exec.broker().open_bracket_count("BTCUSDT"), 1);
        assert!((exec.available_cash().unwrap() - 800.0).abs() < 1e-9);

        let report = exec.current_position("BTCUSDT").unwrap().unwrap();
        assert!((report.entry_price - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn exit_cancels_bracket_and_sells() {
        let mut exec = execution();
        exec.submit(&order(TradeDecision::EnterLong {
            size: 2.0,
            stop_distance: None,
        }))
        .unwrap();
        let fill = exec
            .submit(&order(TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal,
            }))
            .unwrap();
        assert!((fill.quantity - 2.0).abs() < f64::EPSILON);
        assert_eq!(exec.broker().open_bracket_count("BTCUSDT"), 0);
        assert!(exec.current_position("BTCUSDT").unwrap().is_none());
    }

    #[test]
    fn failed_bracket_keeps_the_fill() {
        let mut exec = execution();
        // stop above the fill makes the bracket invalid
        let fill = exec.submit(&order(TradeDecision::EnterLong {
            size: 1.0,
            stop_distance: Some(-50.0),
        }));
        assert!(fill.is_ok());
        assert_eq!(exec.broker().open_bracket_count("BTCUSDT"), 0);
        assert!(exec.current_position("BTCUSDT").unwrap().is_some());
    }

    #[test]
    fn broker_failures_become_rejections() {
        let mut exec = execution();
        let err = exec
            .submit(&order(TradeDecision::EnterLong {
                size: 50.0,
                stop_distance: None,
            }))
            .unwrap_err();
        assert!(matches!(err, Rejection::Exchange { .. }));

        let err = exec
            .submit(&order(TradeDecision::ExitLong {
                reason: ExitReason::StopLoss,
            }))
            .unwrap_err();
        assert!(matches!(err, Rejection::NoPosition { .. }));
    }

    #[test]
    fn bracket_fill_on_exchange_shows_as_flat() {
        let mut exec = execution();
        exec.submit(&order(TradeDecision::EnterLong {
            size: 1.0,
            stop_distance: None,
        }))
        .unwrap();
        exec.on_price("BTCUSDT", ts(), 97.0);
        assert!(exec.current_position("BTCUSDT").unwrap().is_none());
    }

    /// Delegates to a paper account, optionally failing market sells or
    /// hiding prices.
    struct FlakyBroker {
        inner: PaperBroker,
        fail_sells: bool,
        hide_prices: bool,
    }

    impl BrokerGateway for FlakyBroker {
        fn balances(&self) -> Result<Vec<crate::ports::broker_port::Balance>, SigtraderError> {
            self.inner.balances()
        }

        fn free_balance(&self, asset: &str) -> Result<f64, SigtraderError> {
            self.inner.free_balance(asset)
        }

        fn position_size(&self, symbol: &str) -> Result<f64, SigtraderError> {
            self.inner.position_size(symbol)
        }

        fn last_price(&self, symbol: &str) -> Result<Option<f64>, SigtraderError> {
            if self.hide_prices {
                return Ok(None);
            }
            self.inner.last_price(symbol)
        }

        fn place_market_order(
            &mut self,
            symbol: &str,
            side: OrderSide,
            quantity: f64,
        ) -> Result<crate::ports::broker_port::BrokerFill, SigtraderError> {
            if self.fail_sells && side == OrderSide::Sell {
                return Err(SigtraderError::Broker {
                    reason: "sell rejected".into(),
                });
            }
            self.inner.place_market_order(symbol, side, quantity)
        }

        fn place_bracket_order(
            &mut self,
            symbol: &str,
            quantity: f64,
            stop_price: f64,
            take_profit_price: f64,
        ) -> Result<u64, SigtraderError> {
            self.inner
                .place_bracket_order(symbol, quantity, stop_price, take_profit_price)
        }

        fn cancel_open_orders(&mut self, symbol: &str) -> Result<usize, SigtraderError> {
            self.inner.cancel_open_orders(symbol)
        }

        fn on_price(&mut self, symbol: &str, timestamp: NaiveDateTime, price: f64) {
            self.inner.on_price(symbol, timestamp, price);
        }
    }

    fn flaky_execution(fail_sells: bool, hide_prices: bool) -> BrokerExecution<FlakyBroker> {
        let broker = FlakyBroker {
            inner: PaperBroker::new("USDT", 1_000.0, 0.0),
            fail_sells,
            hide_prices,
        };
        let mut exec = BrokerExecution::new(broker, "USDT", BracketConfig::default());
        exec.on_price("BTCUSDT", ts(), 100.0);
        exec
    }

    #[test]
    fn failed_exit_sell_restores_the_bracket() {
        let mut exec = flaky_execution(true, false);
        exec.submit(&order(TradeDecision::EnterLong {
            size: 1.0,
            stop_distance: Some(5.0),
        }))
        .unwrap();
        assert_eq!(exec.broker().inner.open_bracket_count("BTCUSDT"), 1);

        let err = exec
            .submit(&order(TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal,
            }))
            .unwrap_err();
        assert!(matches!(err, Rejection::Exchange { .. }));
        assert_eq!(exec.broker().inner.open_bracket_count("BTCUSDT"), 1);

        // the restored stop still closes the position on a crash
        exec.on_price("BTCUSDT", ts(), 50.0);
        assert!(exec.current_position("BTCUSDT").unwrap().is_none());
    }

    #[test]
    fn unpriced_holding_is_an_error() {
        let mut exec = flaky_execution(false, true);
        exec.broker_mut()
            .inner
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.0)
            .unwrap();
        assert!(matches!(
            exec.current_position("BTCUSDT"),
            Err(SigtraderError::Broker { .. })
        ));
    }
}
