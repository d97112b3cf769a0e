//! Per-bar indicator snapshot for one instrument.
//!
//! [`IndicatorBundle`] runs every configured indicator over a candle history
//! and lines the outputs up into typed [`IndicatorSnapshot`]s, one per bar.
//! Because no indicator looks ahead, the snapshot at index `i` of a full
//! history equals the snapshot computed from `candles[..=i]` alone.

use chrono::NaiveDateTime;

use crate::domain::indicator::{
    IndicatorType, IndicatorValue, calculate_adx, calculate_atr,
    calculate_bollinger, calculate_ema, calculate_ichimoku, calculate_macd, calculate_rsi,
    calculate_stochastic,
};
use crate::domain::ohlcv::Candle;

/// Periods and multipliers for every indicator in the bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub short_window: usize,
    pub long_window: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    pub adx_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_mult: f64,
    pub stochastic_k: usize,
    pub stochastic_d_fast: usize,
    pub stochastic_d_slow: usize,
    pub ichimoku_tenkan: usize,
    pub ichimoku_kijun: usize,
    pub ichimoku_senkou: usize,
    pub ichimoku_lead: usize,
    /// EMA period used as a learned-model feature.
    pub feature_ema_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 20,
            atr_period: 14,
            rsi_period: 14,
            adx_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_mult: 2.0,
            stochastic_k: 14,
            stochastic_d_fast: 3,
            stochastic_d_slow: 3,
            ichimoku_tenkan: 9,
            ichimoku_kijun: 26,
            ichimoku_senkou: 52,
            ichimoku_lead: 26,
            feature_ema_period: 14,
        }
    }
}

impl IndicatorParams {
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Ema(self.short_window),
            IndicatorType::Ema(self.long_window),
            IndicatorType::Ema(self.feature_ema_period),
            IndicatorType::Macd {
                fast: self.macd_fast,
                slow: self.macd_slow,
                signal: self.macd_signal,
            },
            IndicatorType::Adx(self.adx_period),
            IndicatorType::Rsi(self.rsi_period),
            IndicatorType::Atr(self.atr_period),
            IndicatorType::Bollinger {
                period: self.bollinger_period,
                stddev_mult_x100: self.bollinger_mult_x100(),
            },
            IndicatorType::Stochastic {
                k_period: self.stochastic_k,
                d_fast: self.stochastic_d_fast,
                d_slow: self.stochastic_d_slow,
            },
            IndicatorType::Ichimoku {
                tenkan: self.ichimoku_tenkan,
                kijun: self.ichimoku_kijun,
                senkou: self.ichimoku_senkou,
                lead: self.ichimoku_lead,
            },
        ]
    }

    fn bollinger_mult_x100(&self) -> u32 {
        (self.bollinger_mult * 100.0).round().max(0.0) as u32
    }
}

/// Indicator values for one instrument at one bar. `None` means unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ema_short: Option<f64>,
    pub ema_long: Option<f64>,
    pub ema_feature: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub adx: Option<f64>,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub bollinger_mid: Option<f64>,
    pub bollinger_upper: Option<f64>,
    pub bollinger_lower: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub ichimoku_span_a: Option<f64>,
    pub ichimoku_span_b: Option<f64>,
}

impl IndicatorSnapshot {
    /// A snapshot carrying only the bar itself, every indicator unavailable.
    pub fn bare(candle: &Candle) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            timestamp: candle.timestamp,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            ema_short: None,
            ema_long: None,
            ema_feature: None,
            macd_line: None,
            macd_signal: None,
            adx: None,
            rsi: None,
            atr: None,
            bollinger_mid: None,
            bollinger_upper: None,
            bollinger_lower: None,
            stoch_k: None,
            stoch_d: None,
            ichimoku_span_a: None,
            ichimoku_span_b: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorBundle {
    pub params: IndicatorParams,
}

impl IndicatorBundle {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    /// Bars of history needed before every indicator in the bundle is available.
    pub fn lookback(&self) -> usize {
        self.params
            .indicator_types()
            .iter()
            .map(IndicatorType::lookback)
            .max()
            .unwrap_or(0)
    }

    /// One snapshot per candle.
    pub fn compute(&self, candles: &[Candle]) -> Vec<IndicatorSnapshot> {
        let p = &self.params;
        let ema_short = calculate_ema(candles, p.short_window);
        let ema_long = calculate_ema(candles, p.long_window);
        let ema_feature = calculate_ema(candles, p.feature_ema_period);
        let macd = calculate_macd(candles, p.macd_fast, p.macd_slow, p.macd_signal);
        let adx = calculate_adx(candles, p.adx_period);
        let rsi = calculate_rsi(candles, p.rsi_period);
        let atr = calculate_atr(candles, p.atr_period);
        let bollinger =
            calculate_bollinger(candles, p.bollinger_period, p.bollinger_mult_x100());
        let stochastic = calculate_stochastic(
            candles,
            p.stochastic_k,
            p.stochastic_d_fast,
            p.stochastic_d_slow,
        );
        let ichimoku = calculate_ichimoku(
            candles,
            p.ichimoku_tenkan,
            p.ichimoku_kijun,
            p.ichimoku_senkou,
            p.ichimoku_lead,
        );

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let mut snap = IndicatorSnapshot::bare(candle);
                snap.ema_short = finite(ema_short.simple_at(i));
                snap.ema_long = finite(ema_long.simple_at(i));
                snap.ema_feature = finite(ema_feature.simple_at(i));
                snap.rsi = finite(rsi.simple_at(i));
                snap.atr = finite(atr.simple_at(i));
                if let Some(IndicatorValue::Macd { line, signal, .. }) = macd.value_at(i) {
                    snap.macd_line = finite(Some(*line));
                    snap.macd_signal = finite(Some(*signal));
                }
                if let Some(IndicatorValue::Adx { adx, .. }) = adx.value_at(i) {
                    snap.adx = finite(Some(*adx));
                }
                if let Some(IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                }) = bollinger.value_at(i)
                {
                    snap.bollinger_mid = finite(Some(*middle));
                    snap.bollinger_upper = finite(Some(*upper));
                    snap.bollinger_lower = finite(Some(*lower));
                }
                if let Some(IndicatorValue::Stochastic { k, d }) = stochastic.value_at(i) {
                    snap.stoch_k = finite(Some(*k));
                    snap.stoch_d = finite(Some(*d));
                }
                if let Some(IndicatorValue::Ichimoku { span_a, span_b }) = ichimoku.value_at(i) {
                    snap.ichimoku_span_a = finite(Some(*span_a));
                    snap.ichimoku_span_b = finite(Some(*span_b));
                }
                snap
            })
            .collect()
    }

    /// Snapshot for the last candle of `candles`, if any.
    pub fn snapshot(&self, candles: &[Candle]) -> Option<IndicatorSnapshot> {
        self.compute(candles).pop()
    }
}

/// A non-finite output is reported as unavailable.
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
