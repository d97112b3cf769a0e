//! Technical indicator implementations.
//!
//! Every indicator is a pure function of a candle history and produces one
//! point per input candle. A point's value is `None` until the indicator's own
//! lookback window is filled; a warming-up indicator never reports a
//! substitute number.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorValue`: enum for the different indicator output shapes
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a time series of indicator values
//! - [`bundle`]: the typed per-bar snapshot consumed by the signal engines

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod bundle;
pub mod ema;
pub mod ichimoku;
pub mod macd;
pub mod rsi;
pub mod stochastic;

pub use adx::calculate_adx;
pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use ichimoku::calculate_ichimoku;
pub use macd::calculate_macd;
pub use rsi::calculate_rsi;
pub use stochastic::calculate_stochastic;

use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub value: Option<IndicatorValue>,
}

impl IndicatorPoint {
    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Adx {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Ichimoku {
        span_a: f64,
        span_b: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_fast: usize,
        d_slow: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Ichimoku {
        tenkan: usize,
        kijun: usize,
        senkou: usize,
        lead: usize,
    },
}

impl IndicatorType {
    /// Number of bars of history needed before the first valid value.
    ///
    /// The first `lookback() - 1` points of a series are always `None`.
    pub fn lookback(&self) -> usize {
        match *self {
            IndicatorType::Ema(period) | IndicatorType::Atr(period) => period,
            IndicatorType::Rsi(period) => period + 1,
            IndicatorType::Adx(period) => 2 * period,
            IndicatorType::Macd { fast, slow, signal } => fast.max(slow) + signal - 1,
            IndicatorType::Stochastic {
                k_period,
                d_fast,
                d_slow,
            } => k_period + d_fast + d_slow - 2,
            IndicatorType::Bollinger { period, .. } => period,
            IndicatorType::Ichimoku {
                tenkan,
                kijun,
                senkou,
                lead,
            } => tenkan.max(kijun).max(senkou) + lead,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Assemble a series from per-bar values aligned with `candles`.
    pub(crate) fn from_values(
        indicator_type: IndicatorType,
        candles: &[crate::domain::ohlcv::Candle],
        values: Vec<Option<IndicatorValue>>,
    ) -> Self {
        let values = candles
            .iter()
            .zip(values)
            .map(|(c, value)| IndicatorPoint {
                timestamp: c.timestamp,
                value,
            })
            .collect();
        IndicatorSeries {
            indicator_type,
            values,
        }
    }

    pub fn value_at(&self, index: usize) -> Option<&IndicatorValue> {
        self.values.get(index).and_then(|p| p.value.as_ref())
    }

    /// The scalar at `index` for single-output indicators.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        match self.value_at(index) {
            Some(IndicatorValue::Simple(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn first_valid_index(&self) -> Option<usize> {
        self.values.iter().position(IndicatorPoint::is_valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic {
                k_period,
                d_fast,
                d_slow,
            } => write!(f, "STOCHASTIC({},{},{})", k_period, d_fast, d_slow),
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Ichimoku {
                tenkan,
                kijun,
                senkou,
                lead,
            } => write!(f, "ICHIMOKU({},{},{},{})", tenkan, kijun, senkou, lead),
        }
    }
}

/// Simple moving average over optional inputs.
///
/// A window containing any `None` produces `None`.
pub(crate) fn sma_options(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for (i, slot) in out.iter_mut().enumerate().skip(period - 1) {
        let window = &values[i + 1 - period..=i];
        let mut sum = 0.0;
        let mut complete = true;
        for v in window {
            match v {
                Some(x) => sum += x,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            *slot = Some(sum / period as f64);
        }
    }
    out
}

/// Highest high and lowest low over the `period` candles ending at `end`.
pub(crate) fn high_low_range(
    candles: &[crate::domain::ohlcv::Candle],
    end: usize,
    period: usize,
) -> (f64, f64) {
    let window = &candles[end + 1 - period..=end];
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    (high, low)
}
