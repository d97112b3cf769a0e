//! Slow Stochastic oscillator.
//!
//! raw%K = 100 * (C - LL) / (HH - LL) over k bars (unavailable when HH == LL)
//! %K = SMA(raw%K, d_fast), %D = SMA(%K, d_slow)

use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, IndicatorValue, high_low_range, sma_options,
};
use crate::domain::ohlcv::Candle;

pub fn calculate_stochastic(
    candles: &[Candle],
    k_period: usize,
    d_fast: usize,
    d_slow: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stochastic {
        k_period,
        d_fast,
        d_slow,
    };
    if k_period == 0 || d_fast == 0 || d_slow == 0 {
        let values = vec![None; candles.len()];
        return IndicatorSeries::from_values(indicator_type, candles, values);
    }

    let raw: Vec<Option<f64>> = (0..candles.len())
        .map(|i| {
            if i + 1 < k_period {
                return None;
            }
            let (high, low) = high_low_range(candles, i, k_period);
            let range = high - low;
            if range == 0.0 {
                None
            } else {
                Some(100.0 * (candles[i].close - low) / range)
            }
        })
        .collect();

    let k = sma_options(&raw, d_fast);
    let d = sma_options(&k, d_slow);

    let values = k
        .into_iter()
        .zip(d)
        .map(|(k, d)| Some(IndicatorValue::Stochastic { k: k?, d: d? }))
        .collect();

    IndicatorSeries::from_values(indicator_type, candles, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::hlc_bars;

    fn kd(series: &IndicatorSeries, i: usize) -> (f64, f64) {
        match series.value_at(i) {
            Some(IndicatorValue::Stochastic { k, d }) => (*k, *d),
            other => panic!("expected Stochastic, got {:?}", other),
        }
    }

    #[test]
    fn stochastic_warmup() {
        let bars: Vec<_> = (0..12)
            .map(|i| {
                let c = 10.0 + i as f64;
                (c + 1.0, c - 1.0, c)
            })
            .collect();
        let series = calculate_stochastic(&hlc_bars(&bars), 5, 3, 3);
        assert_eq!(series.first_valid_index(), Some(8));
        assert_eq!(series.indicator_type.lookback(), 9);
    }

    #[test]
    fn stochastic_close_at_high_is_100() {
        let bars: Vec<_> = (0..10)
            .map(|i| {
                let c = 10.0 + i as f64;
                (c, c - 2.0, c)
            })
            .collect();
        let series = calculate_stochastic(&hlc_bars(&bars), 3, 1, 1);
        let (k, d) = kd(&series, 9);
        assert!((k - 100.0).abs() < 1e-12);
        assert!((d - 100.0).abs() < 1e-12);
    }

    #[test]
    fn stochastic_flat_window_is_unavailable() {
        let series = calculate_stochastic(&hlc_bars(&[(5.0, 5.0, 5.0); 10]), 3, 2, 2);
        assert_eq!(series.first_valid_index(), None);
    }

    #[test]
    fn stochastic_smoothing() {
        let bars = hlc_bars(&[
            (10.0, 8.0, 9.0),
            (12.0, 9.0, 11.0),
            (12.0, 10.0, 10.0),
            (13.0, 11.0, 13.0),
        ]);
        let series = calculate_stochastic(&bars, 2, 2, 1);
        // raw[1] = 100*(11-8)/(12-8) = 75
        // raw[2] = 100*(10-9)/(12-9) = 33.33..
        // raw[3] = 100*(13-10)/(13-10) = 100
        let (k, d) = kd(&series, 3);
        let expected = (100.0 / 3.0 + 100.0) / 2.0;
        assert!((k - expected).abs() < 1e-9);
        assert!((d - expected).abs() < 1e-9);
        let (k2, _) = kd(&series, 2);
        assert!((k2 - (75.0 + 100.0 / 3.0) / 2.0).abs() < 1e-9);
    }
}
