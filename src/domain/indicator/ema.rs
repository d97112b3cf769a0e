//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are unavailable.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub fn calculate_ema(candles: &[Candle], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let values = ema_values(&closes, period)
        .into_iter()
        .map(|v| v.map(IndicatorValue::Simple))
        .collect();
    IndicatorSeries::from_values(IndicatorType::Ema(period), candles, values)
}

/// EMA over a plain series. The seed is the mean of the first `period` inputs.
pub(crate) fn ema_values(inputs: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; inputs.len()];
    if period == 0 || inputs.len() < period {
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = inputs[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema);
    for i in period..inputs.len() {
        ema = inputs[i] * k + ema * (1.0 - k);
        out[i] = Some(ema);
    }
    out
}

/// EMA over a series that starts with unavailable values.
///
/// Leading `None`s are skipped; the EMA is seeded from the first `period`
/// available inputs. A gap after the seed resets nothing and yields `None`.
pub(crate) fn ema_options(inputs: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; inputs.len()];
    let Some(start) = inputs.iter().position(Option::is_some) else {
        return out;
    };
    let tail: Vec<f64> = inputs[start..].iter().map_while(|v| *v).collect();
    for (offset, v) in ema_values(&tail, period).into_iter().enumerate() {
        out[start + offset] = v;
    }
    out
}
