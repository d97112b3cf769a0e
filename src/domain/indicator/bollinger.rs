//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are unavailable.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub fn calculate_bollinger(
    candles: &[Candle],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;

    let values = (0..candles.len())
        .map(|i| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let window = &candles[i + 1 - period..=i];
            let middle = window.iter().map(|c| c.close).sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|c| {
                    let diff = c.close - middle;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            let stddev = variance.sqrt();
            Some(IndicatorValue::Bollinger {
                upper: middle + mult * stddev,
                middle,
                lower: middle - mult * stddev,
            })
        })
        .collect();

    IndicatorSeries::from_values(
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        candles,
        values,
    )
}
