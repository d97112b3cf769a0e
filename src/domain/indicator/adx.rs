//! ADX (Average Directional Index, Wilder).
//!
//! 1. +DM / -DM and TR from consecutive bars
//! 2. Wilder-smooth all three over n
//! 3. +DI = 100 * sm(+DM) / sm(TR), -DI likewise
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! Lookback: 2n (n bars for the DI smoothing, n more for the ADX seed).

use crate::domain::indicator::atr::wilder_smooth;
use crate::domain::indicator::{IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Candle;

pub fn calculate_adx(candles: &[Candle], period: usize) -> IndicatorSeries {
    let n = candles.len();
    let mut tr = vec![None; n];
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];

    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
        tr[i] = Some(candles[i].true_range(candles[i - 1].close));
    }

    let smooth_tr = wilder_smooth(&tr, period);
    let smooth_plus = wilder_smooth(&plus_dm, period);
    let smooth_minus = wilder_smooth(&minus_dm, period);

    let mut di = vec![None; n];
    let mut dx = vec![None; n];
    for i in 0..n {
        let (Some(str_), Some(sp), Some(sm)) = (smooth_tr[i], smooth_plus[i], smooth_minus[i])
        else {
            continue;
        };
        let (plus_di, minus_di) = if str_ == 0.0 {
            (0.0, 0.0)
        } else {
            (100.0 * sp / str_, 100.0 * sm / str_)
        };
        let di_sum = plus_di + minus_di;
        dx[i] = Some(if di_sum == 0.0 {
            0.0
        } else {
            100.0 * (plus_di - minus_di).abs() / di_sum
        });
        di[i] = Some((plus_di, minus_di));
    }

    let adx = wilder_smooth(&dx, period);
    let values = adx
        .into_iter()
        .zip(di)
        .map(|(a, d)| match (a, d) {
            (Some(adx), Some((plus_di, minus_di))) => Some(IndicatorValue::Adx {
                adx,
                plus_di,
                minus_di,
            }),
            _ => None,
        })
        .collect();

    IndicatorSeries::from_values(IndicatorType::Adx(period), candles, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars::hlc_bars;

    fn adx_at(series: &IndicatorSeries, i: usize) -> f64 {
        match series.value_at(i) {
            Some(IndicatorValue::Adx { adx, .. }) => *adx,
            other => panic!("expected ADX value, got {:?}", other),
        }
    }

    #[test]
    fn adx_warmup_is_two_periods() {
        let bars: Vec<_> = (0..20)
            .map(|i| {
                let c = 100.0 + i as f64;
                (c + 1.0, c - 1.0, c)
            })
            .collect();
        let series = calculate_adx(&hlc_bars(&bars), 5);
        assert_eq!(series.first_valid_index(), Some(9));
    }

    #[test]
    fn adx_strong_uptrend_is_high() {
        let bars: Vec<_> = (0..40)
            .map(|i| {
                let c = 100.0 + 2.0 * i as f64;
                (c + 1.0, c - 1.0, c)
            })
            .collect();
        let series = calculate_adx(&hlc_bars(&bars), 7);
        let last = adx_at(&series, 39);
        // pure up-moves: -DM is always zero, so DX = 100 every bar
        assert!((last - 100.0).abs() < 1e-9);
        match series.value_at(39) {
            Some(IndicatorValue::Adx {
                plus_di, minus_di, ..
            }) => {
                assert!(*plus_di > 0.0);
                assert!(minus_di.abs() < f64::EPSILON);
            }
            _ => panic!("expected ADX"),
        }
    }

    #[test]
    fn adx_bounds() {
        let bars: Vec<_> = (0..60)
            .map(|i| {
                let c = 100.0 + ((i * 13) % 7) as f64 - 3.0;
                (c + 1.5, c - 1.0, c)
            })
            .collect();
        let series = calculate_adx(&hlc_bars(&bars), 14);
        for i in series.first_valid_index().unwrap()..60 {
            let v = adx_at(&series, i);
            assert!((0.0..=100.0).contains(&v), "ADX {} out of range", v);
        }
    }

    #[test]
    fn adx_flat_prices_are_zero() {
        let series = calculate_adx(&hlc_bars(&[(10.0, 10.0, 10.0); 10]), 3);
        assert!(adx_at(&series, 9).abs() < f64::EPSILON);
    }

    #[test]
    fn adx_short_input() {
        let series = calculate_adx(&hlc_bars(&[(10.0, 9.0, 9.5)]), 3);
        assert_eq!(series.values.len(), 1);
        assert_eq!(series.first_valid_index(), None);
    }
}
