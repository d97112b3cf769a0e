//! Average True Range (Wilder).
//!
//! TR[0] = high - low; TR[i] = max(H-L, |H-prevC|, |L-prevC|).
//! Seeded with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.
//!
//! Warmup: first (n-1) bars are unavailable.

use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    let tr: Vec<Option<f64>> = true_ranges(candles).into_iter().map(Some).collect();
    let values = wilder_smooth(&tr, period)
        .into_iter()
        .map(|v| v.map(IndicatorValue::Simple))
        .collect();
    IndicatorSeries::from_values(IndicatorType::Atr(period), candles, values)
}

pub(crate) fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect()
}

/// Wilder running average starting at the first available input.
///
/// The seed is the mean of the first `period` available values; a `None`
/// after the seed ends the series.
pub(crate) fn wilder_smooth(inputs: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; inputs.len()];
    if period == 0 {
        return out;
    }
    let Some(start) = inputs.iter().position(Option::is_some) else {
        return out;
    };
    let seed_end = start + period - 1;
    if seed_end >= inputs.len() {
        return out;
    }

    let mut sum = 0.0;
    for v in &inputs[start..=seed_end] {
        match v {
            Some(x) => sum += x,
            None => return out,
        }
    }
    let n = period as f64;
    let mut avg = sum / n;
    out[seed_end] = Some(avg);
    for i in (seed_end + 1)..inputs.len() {
        let Some(x) = inputs[i] else { break };
        avg = (avg * (n - 1.0) + x) / n;
        out[i] = Some(avg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::hlc_bars;

    #[test]
    fn atr_warmup() {
        let bars = hlc_bars(&[(11.0, 9.0, 10.0); 5]);
        let series = calculate_atr(&bars, 3);
        assert_eq!(series.first_valid_index(), Some(2));
    }

    #[test]
    fn atr_constant_range() {
        let bars = hlc_bars(&[(11.0, 9.0, 10.0); 6]);
        let series = calculate_atr(&bars, 3);
        for i in 2..6 {
            assert!((series.simple_at(i).unwrap() - 2.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn atr_wilder_step_uses_gap() {
        // TR: 2, 2, 2, then gap up: max(2, |22-10|, |20-10|) = 12
        let bars = hlc_bars(&[
            (11.0, 9.0, 10.0),
            (11.0, 9.0, 10.0),
            (11.0, 9.0, 10.0),
            (22.0, 20.0, 21.0),
        ]);
        let series = calculate_atr(&bars, 3);
        let expected = (2.0 * 2.0 + 12.0) / 3.0;
        assert!((series.simple_at(3).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn atr_zero_on_flat_prices() {
        let bars = hlc_bars(&[(10.0, 10.0, 10.0); 4]);
        let series = calculate_atr(&bars, 2);
        assert_eq!(series.simple_at(3), Some(0.0));
    }

    #[test]
    fn wilder_smooth_offsets_from_first_value() {
        let inputs = vec![None, Some(3.0), Some(3.0), Some(6.0)];
        let out = wilder_smooth(&inputs, 2);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(3.0));
        assert_eq!(out[3], Some(4.5));
    }
}
