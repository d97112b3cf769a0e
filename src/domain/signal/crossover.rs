//! EMA crossover with RSI extremes, fired on signal transitions.
//!
//! Each bar is classified:
//! - buy: EMA short > EMA long and RSI < `rsi_buy_below`
//! - sell: EMA short < EMA long and RSI > `rsi_sell_above`
//! - neutral otherwise
//!
//! A flat instrument enters only when the class flips from sell to buy
//! between consecutive bars; a long one exits only on a flip from buy to
//! sell. A bar with unavailable indicators breaks the chain.

use tracing::debug;

use crate::domain::decision::{ExitReason, SkipReason, TradeDecision};
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator::bundle::IndicatorParams;
use crate::domain::instrument_state::InstrumentState;
use crate::domain::signal::{SignalEngine, StepInput, usable};
use crate::domain::sizing::{PositionSizer, SizingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossSignal {
    Buy,
    Neutral,
    Sell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossoverThresholds {
    pub rsi_buy_below: f64,
    pub rsi_sell_above: f64,
}

impl Default for CrossoverThresholds {
    fn default() -> Self {
        Self {
            rsi_buy_below: 30.0,
            rsi_sell_above: 70.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrossoverSignalEngine {
    pub thresholds: CrossoverThresholds,
    pub sizer: PositionSizer,
}

impl Default for CrossoverSignalEngine {
    fn default() -> Self {
        Self {
            thresholds: CrossoverThresholds::default(),
            sizer: PositionSizer::default().with_mode(SizingMode::BalancePct { pct: 0.01 }),
        }
    }
}

impl CrossoverSignalEngine {
    pub fn new(thresholds: CrossoverThresholds, sizer: PositionSizer) -> Self {
        Self { thresholds, sizer }
    }

    pub fn classify(&self, ema_short: f64, ema_long: f64, rsi: f64) -> CrossSignal {
        let t = &self.thresholds;
        if ema_short > ema_long && rsi < t.rsi_buy_below {
            CrossSignal::Buy
        } else if ema_short < ema_long && rsi > t.rsi_sell_above {
            CrossSignal::Sell
        } else {
            CrossSignal::Neutral
        }
    }
}

impl SignalEngine for CrossoverSignalEngine {
    fn name(&self) -> &'static str {
        "crossover"
    }

    /// One bar beyond the indicator warm-up, so a transition can be seen.
    fn required_history(&self, params: &IndicatorParams) -> usize {
        [
            IndicatorType::Ema(params.short_window),
            IndicatorType::Ema(params.long_window),
            IndicatorType::Rsi(params.rsi_period),
        ]
        .iter()
        .map(IndicatorType::lookback)
        .max()
        .unwrap_or(0)
            + 1
    }

    fn evaluate(
        &self,
        input: &StepInput<'_>,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason> {
        let snap = input.snapshot;
        let (Some(ema_short), Some(ema_long), Some(rsi), Some(close)) = (
            usable(snap.ema_short),
            usable(snap.ema_long),
            usable(snap.rsi),
            usable(Some(snap.close)),
        ) else {
            state.cross_signal = None;
            return Err(SkipReason::DataUnavailable);
        };

        let current = self.classify(ema_short, ema_long, rsi);
        let previous = state.cross_signal.replace(current);
        debug!(
            symbol = %snap.symbol,
            timestamp = %snap.timestamp,
            ema_short,
            ema_long,
            rsi,
            signal = ?current,
            previous = ?previous,
            "crossover signal"
        );

        match (previous, current, state.position.is_long()) {
            (Some(CrossSignal::Sell), CrossSignal::Buy, false) => {
                let atr = usable(snap.atr);
                let size = self.sizer.order_size(input.available_cash, close, atr);
                if size <= 0.0 {
                    return Err(SkipReason::DegenerateSizing {
                        atr: atr.unwrap_or(0.0),
                        size,
                    });
                }
                Ok(TradeDecision::EnterLong {
                    size,
                    stop_distance: None,
                })
            }
            (Some(CrossSignal::Buy), CrossSignal::Sell, true) => Ok(TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal,
            }),
            _ => Ok(TradeDecision::NoAction),
        }
    }
}
