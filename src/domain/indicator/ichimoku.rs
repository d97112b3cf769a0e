//! Ichimoku cloud (leading spans only).
//!
//! Tenkan = midpoint of the high/low range over `tenkan` bars, Kijun likewise.
//! Span A = (Tenkan + Kijun) / 2 and Span B = midpoint over `senkou` bars,
//! both plotted `lead` bars ahead: the value reported at bar i was computed
//! from bars up to i - lead. The cloud at bar i uses no future data.

use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, IndicatorValue, high_low_range,
};
use crate::domain::ohlcv::Candle;

pub fn calculate_ichimoku(
    candles: &[Candle],
    tenkan: usize,
    kijun: usize,
    senkou: usize,
    lead: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ichimoku {
        tenkan,
        kijun,
        senkou,
        lead,
    };
    if tenkan == 0 || kijun == 0 || senkou == 0 {
        let values = vec![None; candles.len()];
        return IndicatorSeries::from_values(indicator_type, candles, values);
    }

    let midpoint = |i: usize, period: usize| -> Option<f64> {
        if i + 1 < period {
            return None;
        }
        let (high, low) = high_low_range(candles, i, period);
        Some((high + low) / 2.0)
    };

    let values = (0..candles.len())
        .map(|i| {
            let src = i.checked_sub(lead)?;
            let span_a = (midpoint(src, tenkan)? + midpoint(src, kijun)?) / 2.0;
            let span_b = midpoint(src, senkou)?;
            Some(IndicatorValue::Ichimoku { span_a, span_b })
        })
        .collect();

    IndicatorSeries::from_values(indicator_type, candles, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::hlc_bars;

    fn spans(series: &IndicatorSeries, i: usize) -> (f64, f64) {
        match series.value_at(i) {
            Some(IndicatorValue::Ichimoku { span_a, span_b }) => (*span_a, *span_b),
            other => panic!("expected Ichimoku, got {:?}", other),
        }
    }

    fn rising(n: usize) -> Vec<(f64, f64, f64)> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                (c + 1.0, c - 1.0, c)
            })
            .collect()
    }

    #[test]
    fn ichimoku_warmup_includes_lead() {
        let series = calculate_ichimoku(&hlc_bars(&rising(20)), 2, 3, 5, 4);
        assert_eq!(series.first_valid_index(), Some(8));
        assert_eq!(series.indicator_type.lookback(), 9);
    }

    #[test]
    fn ichimoku_spans_are_shifted() {
        let bars = hlc_bars(&rising(20));
        let series = calculate_ichimoku(&bars, 2, 3, 5, 4);
        // value at 10 computed from bars up to 6
        // tenkan(6) = (107 + 104)/2 = 105.5, kijun(6) = (107 + 103)/2 = 105
        // senkou(6) = (107 + 101)/2 = 104
        let (a, b) = spans(&series, 10);
        assert!((a - 105.25).abs() < 1e-12);
        assert!((b - 104.0).abs() < 1e-12);
    }

    #[test]
    fn ichimoku_ignores_future_bars() {
        let bars = hlc_bars(&rising(20));
        let full = calculate_ichimoku(&bars, 2, 3, 5, 4);
        let truncated = calculate_ichimoku(&bars[..12], 2, 3, 5, 4);
        assert_eq!(full.value_at(11), truncated.value_at(11));
    }
}
