#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use sigtrader::domain::decision::{SkipReason, TradeDecision};
use sigtrader::domain::error::{Rejection, SigtraderError};
use sigtrader::domain::indicator::bundle::{IndicatorParams, IndicatorSnapshot};
use sigtrader::domain::instrument_state::InstrumentState;
pub use sigtrader::domain::ohlcv::Candle;
use sigtrader::domain::signal::{SignalEngine, StepInput};
use sigtrader::ports::execution_port::{ExecutionPort, Fill, OrderRequest, PositionReport};
use sigtrader::ports::market_data_port::MarketDataSource;

pub fn ts(day: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::days(day)
}

pub fn make_candle(symbol: &str, day: i64, close: f64) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        timestamp: ts(day),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

pub fn make_candles(symbol: &str, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_candle(symbol, i as i64, c))
        .collect()
}

/// A rising series with a small zigzag, so every indicator has range to
/// work with.
pub fn trending_closes(n: usize, start: f64, step: f64) -> Vec<f64> {
    (0..n)
        .map(|i| start + i as f64 * step + if i % 2 == 0 { 0.8 } else { -0.8 })
        .collect()
}

/// Every rule-based entry condition holds.
pub fn bullish_snapshot(symbol: &str, day: i64, close: f64, atr: f64) -> IndicatorSnapshot {
    IndicatorSnapshot {
        symbol: symbol.to_string(),
        timestamp: ts(day),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
        ema_short: Some(close - 2.0),
        ema_long: Some(close - 5.0),
        ema_feature: Some(close - 3.0),
        macd_line: Some(1.0),
        macd_signal: Some(0.5),
        adx: Some(30.0),
        rsi: Some(55.0),
        atr: Some(atr),
        bollinger_mid: Some(close - 4.0),
        bollinger_upper: Some(close + 4.0),
        bollinger_lower: Some(close - 12.0),
        stoch_k: Some(70.0),
        stoch_d: Some(60.0),
        ichimoku_span_a: Some(close - 6.0),
        ichimoku_span_b: Some(close - 8.0),
    }
}

/// Short EMA below long EMA: no entry. MACD stays above its signal, so an
/// open position is not reversed either.
pub fn neutral_snapshot(symbol: &str, day: i64, close: f64) -> IndicatorSnapshot {
    let mut snap = bullish_snapshot(symbol, day, close, 5.0);
    snap.ema_short = Some(close - 5.0);
    snap.ema_long = Some(close - 2.0);
    snap
}

pub struct MockMarketData {
    pub data: BTreeMap<String, Vec<Candle>>,
    pub errors: BTreeMap<String, String>,
    /// Polls left to fail before `recent_candles` starts answering.
    pub failing_polls: usize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: BTreeMap::new(),
            failing_polls: 0,
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl MarketDataSource for MockMarketData {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, SigtraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SigtraderError::Data {
                reason: reason.clone(),
            });
        }
        let candles = self.data.get(symbol).ok_or_else(|| SigtraderError::NoData {
            symbol: symbol.to_string(),
        })?;
        Ok(candles
            .iter()
            .filter(|c| {
                let date = c.timestamp.date();
                start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
            })
            .cloned()
            .collect())
    }

    fn recent_candles(
        &mut self,
        symbol: &str,
        window: usize,
    ) -> Result<Vec<Candle>, SigtraderError> {
        if self.failing_polls > 0 {
            self.failing_polls -= 1;
            return Err(SigtraderError::Data {
                reason: "feed unavailable".to_string(),
            });
        }
        let all = self.fetch_candles(symbol, None, None)?;
        let start = all.len().saturating_sub(window);
        Ok(all[start..].to_vec())
    }
}

/// Fills every order at the requested price unless told to reject.
pub struct RecordingExecution {
    pub cash: f64,
    pub positions: BTreeMap<String, PositionReport>,
    pub submitted: Vec<OrderRequest>,
    pub reject_with: Option<Rejection>,
}

impl RecordingExecution {
    pub fn new(cash: f64) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            submitted: Vec::new(),
            reject_with: None,
        }
    }

    pub fn rejecting(cash: f64, rejection: Rejection) -> Self {
        Self {
            reject_with: Some(rejection),
            ..Self::new(cash)
        }
    }
}

impl ExecutionPort for RecordingExecution {
    fn available_cash(&self) -> Result<f64, SigtraderError> {
        Ok(self.cash)
    }

    fn current_position(&self, symbol: &str) -> Result<Option<PositionReport>, SigtraderError> {
        Ok(self.positions.get(symbol).cloned())
    }

    fn submit(&mut self, order: &OrderRequest) -> Result<Fill, Rejection> {
        self.submitted.push(order.clone());
        if let Some(rejection) = &self.reject_with {
            return Err(rejection.clone());
        }
        let quantity = match order.decision {
            TradeDecision::EnterLong { size, .. } => {
                self.cash -= size * order.price;
                self.positions.insert(
                    order.symbol.clone(),
                    PositionReport {
                        size,
                        entry_price: order.price,
                    },
                );
                size
            }
            TradeDecision::ExitLong { .. } => {
                let position =
                    self.positions
                        .remove(&order.symbol)
                        .ok_or_else(|| Rejection::NoPosition {
                            symbol: order.symbol.clone(),
                        })?;
                self.cash += position.size * order.price;
                position.size
            }
            TradeDecision::NoAction => return Err(Rejection::InvalidSize { size: 0.0 }),
        };
        Ok(Fill {
            symbol: order.symbol.clone(),
            timestamp: order.timestamp,
            price: order.price,
            quantity,
            commission: 0.0,
        })
    }
}

/// Buys a fixed quantity whenever flat and otherwise holds.
pub struct EnterWhenFlat {
    pub size: f64,
}

impl SignalEngine for EnterWhenFlat {
    fn name(&self) -> &'static str {
        "enter-when-flat"
    }

    fn required_history(&self, _params: &IndicatorParams) -> usize {
        1
    }

    fn evaluate(
        &self,
        _input: &StepInput<'_>,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason> {
        if state.position.is_long() {
            return Ok(TradeDecision::NoAction);
        }
        Ok(TradeDecision::EnterLong {
            size: self.size,
            stop_distance: None,
        })
    }
}

/// Writes `<dir>/<symbol>.csv` in the candle file format.
pub fn write_csv(dir: &Path, symbol: &str, closes: &[f64]) {
    let mut content = String::from("timestamp,open,high,low,close,volume\n");
    for (i, &close) in closes.iter().enumerate() {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            ts(i as i64).format("%Y-%m-%d"),
            close,
            close + 1.0,
            close - 1.0,
            close,
            1000.0
        ));
    }
    fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
}
