//! RSI (Relative Strength Index) indicator.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: the first n bars are unavailable (n price changes are needed).

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    let mut values = vec![None; candles.len()];
    if period == 0 || candles.len() <= period {
        return IndicatorSeries::from_values(IndicatorType::Rsi(period), candles, values);
    }

    let mut gains = vec![0.0; candles.len()];
    let mut losses = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let change = candles[i].close - candles[i - 1].close;
        gains[i] = change.max(0.0);
        losses[i] = (-change).max(0.0);
    }

    let mut avg_gain = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[1..=period].iter().sum::<f64>() / period as f64;
    values[period] = Some(IndicatorValue::Simple(rsi_from(avg_gain, avg_loss)));

    for i in (period + 1)..candles.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        values[i] = Some(IndicatorValue::Simple(rsi_from(avg_gain, avg_loss)));
    }

    IndicatorSeries::from_values(IndicatorType::Rsi(period), candles, values)
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::flat_bars;

    #[test]
    fn rsi_empty_bars() {
        let series = calculate_rsi(&[], 14);
        assert_eq!(series.values.len(), 0);
    }

    #[test]
    fn rsi_warmup() {
        let bars = flat_bars(&[1.0, 2.0, 3.0, 2.0, 3.0, 4.0]);
        let series = calculate_rsi(&bars, 3);
        assert_eq!(series.first_valid_index(), Some(3));
        assert_eq!(series.values.len(), 6);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let bars = flat_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_rsi(&bars, 3);
        assert!((series.simple_at(3).unwrap() - 100.0).abs() < f64::EPSILON);
        assert!((series.simple_at(4).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let bars = flat_bars(&[5.0, 4.0, 3.0, 2.0]);
        let series = calculate_rsi(&bars, 3);
        assert!(series.simple_at(3).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_seed_and_wilder_step() {
        // changes: +2, -1, +1 | +0 ; avg_gain = 1, avg_loss = 1/3
        let bars = flat_bars(&[10.0, 12.0, 11.0, 12.0, 12.0]);
        let series = calculate_rsi(&bars, 3);
        let seed = 100.0 - 100.0 / (1.0 + 1.0 / (1.0 / 3.0));
        assert!((series.simple_at(3).unwrap() - seed).abs() < 1e-10);

        let g = (1.0 * 2.0 + 0.0) / 3.0;
        let l = (1.0 / 3.0 * 2.0 + 0.0) / 3.0;
        let next = 100.0 - 100.0 / (1.0 + g / l);
        assert!((series.simple_at(4).unwrap() - next).abs() < 1e-10);
    }

    #[test]
    fn rsi_stays_in_range() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i * 7) % 11) as f64 - 5.0).collect();
        let series = calculate_rsi(&flat_bars(&closes), 14);
        for p in &series.values {
            if let Some(IndicatorValue::Simple(v)) = p.value {
                assert!((0.0..=100.0).contains(&v));
            }
        }
    }
}
