//! In-memory exchange account for paper trading.
//!
//! Holds a quote-asset balance and per-symbol base quantities, fills market
//! orders at the last seen price and works OCO sell brackets against incoming
//! prices.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::info;

use crate::domain::error::SigtraderError;
use crate::ports::broker_port::{Balance, BrokerFill, BrokerGateway, OrderSide};

#[derive(Debug, Clone, Default, PartialEq)]
struct BaseHolding {
    free: f64,
    /// Reserved by open brackets.
    locked: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Bracket {
    id: u64,
    symbol: String,
    quantity: f64,
    stop_price: f64,
    take_profit_price: f64,
}

#[derive(Debug, Clone)]
pub struct PaperBroker {
    quote_asset: String,
    quote_free: f64,
    commission_pct: f64,
    holdings: BTreeMap<String, BaseHolding>,
    prices: HashMap<String, f64>,
    brackets: Vec<Bracket>,
    next_order_id: u64,
    fills: Vec<BrokerFill>,
}

impl PaperBroker {
    pub fn new(quote_asset: impl Into<String>, quote_balance: f64, commission_pct: f64) -> Self {
        Self {
            quote_asset: quote_asset.into(),
            quote_free: quote_balance,
            commission_pct,
            holdings: BTreeMap::new(),
            prices: HashMap::new(),
            brackets: Vec::new(),
            next_order_id: 1,
            fills: Vec::new(),
        }
    }

    pub fn quote_asset(&self) -> &str {
        &self.quote_asset
    }

    /// Every fill so far, including triggered bracket legs.
    pub fn fills(&self) -> &[BrokerFill] {
        &self.fills
    }

    pub fn open_bracket_count(&self, symbol: &str) -> usize {
        self.brackets.iter().filter(|b| b.symbol == symbol).count()
    }

    /// `BTCUSDT` -> `BTC` when the quote asset is `USDT`.
    pub fn base_asset<'a>(&self, symbol: &'a str) -> &'a str {
        symbol
            .strip_suffix(self.quote_asset.as_str())
            .filter(|base| !base.is_empty())
            .unwrap_or(symbol)
    }

    fn order_id(&mut self) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }

    fn sell(&mut self, symbol: &str, quantity: f64, price: f64, order_id: u64) -> BrokerFill {
        let proceeds = quantity * price;
        let commission = proceeds * self.commission_pct;
        self.quote_free += proceeds - commission;
        let fill = BrokerFill {
            order_id,
            side: OrderSide::Sell,
            price,
            quantity,
            commission,
        };
        self.fills.push(fill.clone());
        let holding_empty = self
            .holdings
            .get(symbol)
            .is_some_and(|h| h.free <= 0.0 && h.locked <= 0.0);
        if holding_empty {
            self.holdings.remove(symbol);
        }
        fill
    }
}

fn broker_error(reason: impl Into<String>) -> SigtraderError {
    SigtraderError::Broker {
        reason: reason.into(),
    }
}

impl BrokerGateway for PaperBroker {
    fn balances(&self) -> Result<Vec<Balance>, SigtraderError> {
        let mut balances = vec![Balance {
            asset: self.quote_asset.clone(),
            free: self.quote_free,
            locked: 0.0,
        }];
        balances.extend(self.holdings.iter().map(|(symbol, h)| Balance {
            asset: self.base_asset(symbol).to_string(),
            free: h.free,
            locked: h.locked,
        }));
        balances.retain(|b| b.total() > 0.0);
        Ok(balances)
    }

    fn free_balance(&self, asset: &str) -> Result<f64, SigtraderError> {
        if asset == self.quote_asset {
            return Ok(self.quote_free);
        }
        Ok(self
            .holdings
            .iter()
            .filter(|(symbol, _)| self.base_asset(symbol) == asset)
            .map(|(_, h)| h.free)
            .sum())
    }

    fn position_size(&self, symbol: &str) -> Result<f64, SigtraderError> {
        Ok(self
            .holdings
            .get(symbol)
            .map_or(0.0, |h| h.free + h.locked))
    }

    fn last_price(&self, symbol: &str) -> Result<Option<f64>, SigtraderError> {
        Ok(self.prices.get(symbol).copied())
    }

    fn place_market_order(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
    ) -> Result<BrokerFill, SigtraderError> {
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(broker_error(format!("invalid quantity {}", quantity)));
        }
        let price = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| broker_error(format!("no market price for {}", symbol)))?;

        match side {
            OrderSide::Buy => {
                let cost = quantity * price;
                let commission = cost * self.commission_pct;
                if cost + commission > self.quote_free {
                    return Err(broker_error(format!(
                        "insufficient {} balance: need {:.2}, have {:.2}",
                        self.quote_asset,
                        cost + commission,
                        self.quote_free
                    )));
                }
                self.quote_free -= cost + commission;
                self.holdings.entry(symbol.to_string()).or_default().free += quantity;
                let fill = BrokerFill {
                    order_id: self.order_id(),
                    side,
                    price,
                    quantity,
                    commission,
                };
                self.fills.push(fill.clone());
                Ok(fill)
            }
            OrderSide::Sell => {
                let free = self.holdings.get(symbol).map_or(0.0, |h| h.free);
                if quantity > free {
                    return Err(broker_error(format!(
                        "insufficient {} balance: need {}, have {}",
                        self.base_asset(symbol),
                        quantity,
                        free
                    )));
                }
                if let Some(h) = self.holdings.get_mut(symbol) {
                    h.free -= quantity;
                }
                let id = self.order_id();
                Ok(self.sell(symbol, quantity, price, id))
            }
        }
    }

    fn place_bracket_order(
        &mut self,
        symbol: &str,
        quantity: f64,
        stop_price: f64,
        take_profit_price: f64,
    ) -> Result<u64, SigtraderError> {
        if stop_price >= take_profit_price {
            return Err(broker_error(format!(
                "bracket stop {} must be below take-profit {}",
                stop_price, take_profit_price
            )));
        }
        let holding = self
            .holdings
            .get_mut(symbol)
            .filter(|h| h.free >= quantity)
            .ok_or_else(|| broker_error(format!("not enough {} to bracket", symbol)))?;
        holding.free -= quantity;
        holding.locked += quantity;

        let id = self.order_id();
        self.brackets.push(Bracket {
            id,
            symbol: symbol.to_string(),
            quantity,
            stop_price,
            take_profit_price,
        });
        Ok(id)
    }

    fn cancel_open_orders(&mut self, symbol: &str) -> Result<usize, SigtraderError> {
        let (cancelled, kept): (Vec<Bracket>, Vec<Bracket>) = std::mem::take(&mut self.brackets)
            .into_iter()
            .partition(|b| b.symbol == symbol);
        self.brackets = kept;
        if let Some(h) = self.holdings.get_mut(symbol) {
            for bracket in &cancelled {
                h.locked -= bracket.quantity;
                h.free += bracket.quantity;
            }
        }
        Ok(cancelled.len())
    }

    fn on_price(&mut self, symbol: &str, timestamp: NaiveDateTime, price: f64) {
        self.prices.insert(symbol.to_string(), price);

        let (triggered, waiting): (Vec<Bracket>, Vec<Bracket>) =
            std::mem::take(&mut self.brackets)
                .into_iter()
                .partition(|b| {
                    b.symbol == symbol && (price <= b.stop_price || price >= b.take_profit_price)
                });
        self.brackets = waiting;

        for bracket in triggered {
            let (leg, fill_price) = if price <= bracket.stop_price {
                ("stop", bracket.stop_price)
            } else {
                ("take-profit", bracket.take_profit_price)
            };
            if let Some(h) = self.holdings.get_mut(symbol) {
                h.locked -= bracket.quantity;
            }
            self.sell(symbol, bracket.quantity, fill_price, bracket.id);
            info!(
                %symbol,
                %timestamp,
                leg,
                price = fill_price,
                quantity = bracket.quantity,
                "bracket triggered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn broker_with_price(price: f64) -> PaperBroker {
        let mut broker = PaperBroker::new("USDT", 1_000.0, 0.0);
        broker.on_price("BTCUSDT", ts(), price);
        broker
    }

    #[test]
    fn market_buy_and_sell() {
        let mut broker = broker_with_price(100.0);
        let fill = broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 2.0)
            .unwrap();
        assert!((fill.price - 100.0).abs() < f64::EPSILON);
        assert!((broker.free_balance("USDT").unwrap() - 800.0).abs() < 1e-9);
        assert!((broker.free_balance("BTC").unwrap() - 2.0).abs() < 1e-9);
        assert!((broker.position_size("BTCUSDT").unwrap() - 2.0).abs() < 1e-9);

        broker
            .place_market_order("BTCUSDT", OrderSide::Sell, 2.0)
            .unwrap();
        assert!((broker.free_balance("USDT").unwrap() - 1_000.0).abs() < 1e-9);
        assert!(broker.position_size("BTCUSDT").unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn buy_without_funds_or_price_fails() {
        let mut broker = broker_with_price(100.0);
        assert!(matches!(
            broker.place_market_order("BTCUSDT", OrderSide::Buy, 20.0),
            Err(SigtraderError::Broker { .. })
        ));
        assert!(matches!(
            broker.place_market_order("ETHUSDT", OrderSide::Buy, 1.0),
            Err(SigtraderError::Broker { .. })
        ));
    }

    #[test]
    fn bracket_stop_leg_fires() {
        let mut broker = broker_with_price(100.0);
        broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.0)
            .unwrap();
        broker.place_bracket_order("BTCUSDT", 1.0, 98.0, 102.0).unwrap();
        assert_eq!(broker.open_bracket_count("BTCUSDT"), 1);
        // locked quantity still counts toward the position
        assert!((broker.position_size("BTCUSDT").unwrap() - 1.0).abs() < 1e-9);

        broker.on_price("BTCUSDT", ts(), 97.5);
        assert_eq!(broker.open_bracket_count("BTCUSDT"), 0);
        assert!(broker.position_size("BTCUSDT").unwrap().abs() < f64::EPSILON);
        assert!((broker.free_balance("USDT").unwrap() - 998.0).abs() < 1e-9);
    }

    #[test]
    fn bracket_take_profit_leg_fires() {
        let mut broker = broker_with_price(100.0);
        broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.0)
            .unwrap();
        broker.place_bracket_order("BTCUSDT", 1.0, 98.0, 102.0).unwrap();
        broker.on_price("BTCUSDT", ts(), 101.0);
        assert_eq!(broker.open_bracket_count("BTCUSDT"), 1);
        broker.on_price("BTCUSDT", ts(), 103.0);
        assert!((broker.free_balance("USDT").unwrap() - 1_002.0).abs() < 1e-9);
    }

    #[test]
    fn cancel_releases_locked_quantity() {
        let mut broker = broker_with_price(100.0);
        broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.0)
            .unwrap();
        broker.place_bracket_order("BTCUSDT", 1.0, 98.0, 102.0).unwrap();
        assert!(matches!(
            broker.place_market_order("BTCUSDT", OrderSide::Sell, 1.0),
            Err(SigtraderError::Broker { .. })
        ));
        assert_eq!(broker.cancel_open_orders("BTCUSDT").unwrap(), 1);
        assert!(
            broker
                .place_market_order("BTCUSDT", OrderSide::Sell, 1.0)
                .is_ok()
        );
    }

    #[test]
    fn inverted_bracket_rejected() {
        let mut broker = broker_with_price(100.0);
        broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.0)
            .unwrap();
        assert!(broker.place_bracket_order("BTCUSDT", 1.0, 105.0, 95.0).is_err());
    }

    #[test]
    fn balances_list_non_zero_assets() {
        let mut broker = broker_with_price(100.0);
        broker
            .place_market_order("BTCUSDT", OrderSide::Buy, 1.5)
            .unwrap();
        broker.place_bracket_order("BTCUSDT", 1.0, 90.0, 110.0).unwrap();

        let balances = broker.balances().unwrap();
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].asset, "USDT");
        assert_eq!(balances[1].asset, "BTC");
        assert!((balances[1].free - 0.5).abs() < 1e-9);
        assert!((balances[1].locked - 1.0).abs() < 1e-9);

        let empty = PaperBroker::new("USDT", 0.0, 0.0);
        assert!(empty.balances().unwrap().is_empty());
    }
}
