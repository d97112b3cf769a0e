//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: max(fast, slow) - 1 + signal - 1 bars.

use crate::domain::indicator::ema::{ema_options, ema_values};
use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    candles: &[Candle],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    if fast == 0 || slow == 0 || signal_period == 0 {
        let values = vec![None; candles.len()];
        return IndicatorSeries::from_values(indicator_type, candles, values);
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema_fast = ema_values(&closes, fast);
    let ema_slow = ema_values(&closes, slow);

    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal_line = ema_options(&macd_line, signal_period);

    let values = macd_line
        .into_iter()
        .zip(signal_line)
        .map(|(line, signal)| {
            let (line, signal) = (line?, signal?);
            Some(IndicatorValue::Macd {
                line,
                signal,
                histogram: line - signal,
            })
        })
        .collect();

    IndicatorSeries::from_values(indicator_type, candles, values)
}
