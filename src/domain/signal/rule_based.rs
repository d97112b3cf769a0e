//! Threshold rule engine (flat/long state machine).
//!
//! Entry (flat) needs every condition:
//! - EMA short > EMA long
//! - MACD line > signal line
//! - ADX > `entry_adx_min`
//! - `rsi_lower` < RSI < `rsi_upper`
//! - close > Bollinger middle band
//! - stochastic %K > %D (when enabled)
//! - close above both Ichimoku spans (when enabled)
//!
//! Exit (long), in priority order:
//! 1. close <= stop-loss price fixed at entry
//! 2. EMA short < EMA long, MACD < signal, ADX < `exit_adx_max`,
//!    %K < %D (when enabled), close < Bollinger middle

use tracing::debug;

use crate::domain::decision::{ExitReason, SkipReason, TradeDecision};
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator::bundle::{IndicatorParams, IndicatorSnapshot};
use crate::domain::instrument_state::InstrumentState;
use crate::domain::signal::{SignalEngine, StepInput, usable};
use crate::domain::sizing::PositionSizer;

#[derive(Debug, Clone, PartialEq)]
pub struct RuleThresholds {
    pub entry_adx_min: f64,
    /// Deliberately separate from `entry_adx_min`.
    pub exit_adx_max: f64,
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    pub use_stochastic: bool,
    pub use_ichimoku: bool,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            entry_adx_min: 20.0,
            exit_adx_max: 25.0,
            rsi_lower: 10.0,
            rsi_upper: 90.0,
            use_stochastic: true,
            use_ichimoku: true,
        }
    }
}

impl RuleThresholds {
    /// Tighter band, stronger trend, no stochastic or cloud filters.
    pub fn conservative() -> Self {
        Self {
            entry_adx_min: 25.0,
            exit_adx_max: 25.0,
            rsi_lower: 40.0,
            rsi_upper: 60.0,
            use_stochastic: false,
            use_ichimoku: false,
        }
    }
}

/// The indicator values the rules read, all available.
#[derive(Debug, Clone, Copy)]
struct RuleInputs {
    close: f64,
    ema_short: f64,
    ema_long: f64,
    macd: f64,
    macd_signal: f64,
    adx: f64,
    rsi: f64,
    atr: f64,
    bollinger_mid: f64,
    stochastic: Option<(f64, f64)>,
    cloud: Option<(f64, f64)>,
}

impl RuleInputs {
    fn from_snapshot(snap: &IndicatorSnapshot, t: &RuleThresholds) -> Option<Self> {
        let stochastic = if t.use_stochastic {
            Some((usable(snap.stoch_k)?, usable(snap.stoch_d)?))
        } else {
            None
        };
        let cloud = if t.use_ichimoku {
            Some((usable(snap.ichimoku_span_a)?, usable(snap.ichimoku_span_b)?))
        } else {
            None
        };
        Some(Self {
            close: usable(Some(snap.close))?,
            ema_short: usable(snap.ema_short)?,
            ema_long: usable(snap.ema_long)?,
            macd: usable(snap.macd_line)?,
            macd_signal: usable(snap.macd_signal)?,
            adx: usable(snap.adx)?,
            rsi: usable(snap.rsi)?,
            atr: usable(snap.atr)?,
            bollinger_mid: usable(snap.bollinger_mid)?,
            stochastic,
            cloud,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleBasedSignalEngine {
    pub thresholds: RuleThresholds,
    pub sizer: PositionSizer,
}

impl RuleBasedSignalEngine {
    pub fn new(thresholds: RuleThresholds, sizer: PositionSizer) -> Self {
        Self { thresholds, sizer }
    }

    fn entry_signal(&self, v: &RuleInputs) -> bool {
        let t = &self.thresholds;
        v.ema_short > v.ema_long
            && v.macd > v.macd_signal
            && v.adx > t.entry_adx_min
            && t.rsi_lower < v.rsi
            && v.rsi < t.rsi_upper
            && v.close > v.bollinger_mid
            && v.stochastic.is_none_or(|(k, d)| k > d)
            && v.cloud.is_none_or(|(a, b)| v.close > a && v.close > b)
    }

    fn exit_signal(&self, v: &RuleInputs) -> bool {
        v.ema_short < v.ema_long
            && v.macd < v.macd_signal
            && v.adx < self.thresholds.exit_adx_max
            && v.stochastic.is_none_or(|(k, d)| k < d)
            && v.close < v.bollinger_mid
    }
}

impl SignalEngine for RuleBasedSignalEngine {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn required_history(&self, params: &IndicatorParams) -> usize {
        let mut required = vec![
            IndicatorType::Ema(params.short_window),
            IndicatorType::Ema(params.long_window),
            IndicatorType::Macd {
                fast: params.macd_fast,
                slow: params.macd_slow,
                signal: params.macd_signal,
            },
            IndicatorType::Adx(params.adx_period),
            IndicatorType::Rsi(params.rsi_period),
            IndicatorType::Atr(params.atr_period),
            IndicatorType::Bollinger {
                period: params.bollinger_period,
                stddev_mult_x100: 0,
            },
        ];
        if self.thresholds.use_stochastic {
            required.push(IndicatorType::Stochastic {
                k_period: params.stochastic_k,
                d_fast: params.stochastic_d_fast,
                d_slow: params.stochastic_d_slow,
            });
        }
        if self.thresholds.use_ichimoku {
            required.push(IndicatorType::Ichimoku {
                tenkan: params.ichimoku_tenkan,
                kijun: params.ichimoku_kijun,
                senkou: params.ichimoku_senkou,
                lead: params.ichimoku_lead,
            });
        }
        required.iter().map(IndicatorType::lookback).max().unwrap_or(0)
    }

    fn evaluate(
        &self,
        input: &StepInput<'_>,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason> {
        let snap = input.snapshot;
        let v = RuleInputs::from_snapshot(snap, &self.thresholds)
            .ok_or(SkipReason::DataUnavailable)?;

        debug!(
            symbol = %snap.symbol,
            timestamp = %snap.timestamp,
            ema_short = v.ema_short,
            ema_long = v.ema_long,
            macd = v.macd,
            adx = v.adx,
            rsi = v.rsi,
            "indicators"
        );

        if state.position.is_long() {
            if state.position.should_stop_loss(v.close) {
                return Ok(TradeDecision::ExitLong {
                    reason: ExitReason::StopLoss,
                });
            }
            if self.exit_signal(&v) {
                return Ok(TradeDecision::ExitLong {
                    reason: ExitReason::SignalReversal,
                });
            }
            return Ok(TradeDecision::NoAction);
        }

        if !self.entry_signal(&v) {
            return Ok(TradeDecision::NoAction);
        }

        let size = self
            .sizer
            .order_size(input.available_cash, v.close, Some(v.atr));
        if v.atr <= 0.0 || size <= 0.0 {
            return Err(SkipReason::DegenerateSizing { atr: v.atr, size });
        }
        Ok(TradeDecision::EnterLong {
            size,
            stop_distance: Some(self.sizer.stop_distance(v.atr)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::ExitReason;
    use crate::domain::position::{OpenPosition, PositionState};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    /// A snapshot on which every entry condition holds.
    fn bullish() -> IndicatorSnapshot {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        IndicatorSnapshot {
            symbol: "BTCUSDT".into(),
            timestamp: ts,
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 10.0,
            ema_short: Some(98.0),
            ema_long: Some(95.0),
            ema_feature: Some(97.0),
            macd_line: Some(1.0),
            macd_signal: Some(0.5),
            adx: Some(30.0),
            rsi: Some(55.0),
            atr: Some(5.0),
            bollinger_mid: Some(96.0),
            bollinger_upper: Some(104.0),
            bollinger_lower: Some(88.0),
            stoch_k: Some(70.0),
            stoch_d: Some(60.0),
            ichimoku_span_a: Some(90.0),
            ichimoku_span_b: Some(92.0),
        }
    }

    /// A snapshot on which every reversal condition holds.
    fn bearish() -> IndicatorSnapshot {
        IndicatorSnapshot {
            close: 89.0,
            ema_short: Some(93.0),
            ema_long: Some(95.0),
            macd_line: Some(-1.0),
            macd_signal: Some(-0.5),
            adx: Some(15.0),
            stoch_k: Some(20.0),
            stoch_d: Some(30.0),
            bollinger_mid: Some(96.0),
            ..bullish()
        }
    }

    fn long_state(stop: f64) -> InstrumentState {
        let mut state = InstrumentState::new("BTCUSDT", None);
        state.position = PositionState::Long(OpenPosition {
            entry_price: 100.0,
            stop_loss_price: Some(stop),
            size: 1.0,
            entry_time: bullish().timestamp,
        });
        state
    }

    fn eval(
        engine: &RuleBasedSignalEngine,
        snap: &IndicatorSnapshot,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason> {
        engine.evaluate(
            &StepInput {
                snapshot: snap,
                available_cash: 10_000.0,
            },
            state,
        )
    }

    #[test]
    fn enters_with_risk_sized_order_and_stop() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = InstrumentState::new("BTCUSDT", None);
        match eval(&engine, &bullish(), &mut state).unwrap() {
            TradeDecision::EnterLong {
                size,
                stop_distance,
            } => {
                assert_relative_eq!(size, 10_000.0 * 0.01 / (5.0 * 2.0));
                assert_relative_eq!(stop_distance.unwrap(), 10.0);
            }
            other => panic!("expected entry, got {:?}", other),
        }
        assert!(!state.position.is_long());
    }

    #[test]
    fn any_missing_indicator_skips() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = InstrumentState::new("BTCUSDT", None);
        let snap = IndicatorSnapshot {
            ichimoku_span_b: None,
            ..bullish()
        };
        assert_eq!(
            eval(&engine, &snap, &mut state),
            Err(SkipReason::DataUnavailable)
        );
    }

    #[test]
    fn non_finite_indicator_skips() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = InstrumentState::new("BTCUSDT", None);
        let snaps = [
            IndicatorSnapshot {
                rsi: Some(f64::NAN),
                ..bullish()
            },
            IndicatorSnapshot {
                atr: Some(f64::INFINITY),
                ..bullish()
            },
            IndicatorSnapshot {
                close: f64::NAN,
                ..bullish()
            },
        ];
        for snap in &snaps {
            assert_eq!(
                eval(&engine, snap, &mut state),
                Err(SkipReason::DataUnavailable)
            );
        }
    }

    #[test]
    fn disabled_filters_do_not_require_data() {
        let engine = RuleBasedSignalEngine::new(
            RuleThresholds {
                use_stochastic: false,
                use_ichimoku: false,
                ..RuleThresholds::default()
            },
            PositionSizer::default(),
        );
        let mut state = InstrumentState::new("BTCUSDT", None);
        let snap = IndicatorSnapshot {
            stoch_k: None,
            ichimoku_span_a: None,
            ..bullish()
        };
        assert!(matches!(
            eval(&engine, &snap, &mut state),
            Ok(TradeDecision::EnterLong { .. })
        ));
    }

    #[test]
    fn each_entry_condition_is_required() {
        let engine = RuleBasedSignalEngine::default();
        let failing = [
            IndicatorSnapshot {
                ema_short: Some(94.0),
                ..bullish()
            },
            IndicatorSnapshot {
                macd_line: Some(0.4),
                ..bullish()
            },
            IndicatorSnapshot {
                adx: Some(20.0),
                ..bullish()
            },
            IndicatorSnapshot {
                rsi: Some(90.0),
                ..bullish()
            },
            IndicatorSnapshot {
                rsi: Some(10.0),
                ..bullish()
            },
            IndicatorSnapshot {
                bollinger_mid: Some(100.0),
                ..bullish()
            },
            IndicatorSnapshot {
                stoch_k: Some(50.0),
                ..bullish()
            },
            IndicatorSnapshot {
                ichimoku_span_b: Some(101.0),
                ..bullish()
            },
        ];
        for snap in &failing {
            let mut state = InstrumentState::new("BTCUSDT", None);
            assert_eq!(
                eval(&engine, snap, &mut state),
                Ok(TradeDecision::NoAction),
                "{:?}",
                snap
            );
        }
    }

    #[test]
    fn zero_atr_is_degenerate_sizing() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = InstrumentState::new("BTCUSDT", None);
        let snap = IndicatorSnapshot {
            atr: Some(0.0),
            ..bullish()
        };
        assert!(matches!(
            eval(&engine, &snap, &mut state),
            Err(SkipReason::DegenerateSizing { .. })
        ));
    }

    #[test]
    fn zero_cash_is_degenerate_sizing() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = InstrumentState::new("BTCUSDT", None);
        let result = engine.evaluate(
            &StepInput {
                snapshot: &bullish(),
                available_cash: 0.0,
            },
            &mut state,
        );
        assert!(matches!(result, Err(SkipReason::DegenerateSizing { .. })));
    }

    #[test]
    fn long_never_reenters() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = long_state(90.0);
        assert_eq!(
            eval(&engine, &bullish(), &mut state),
            Ok(TradeDecision::NoAction)
        );
    }

    #[test]
    fn stop_loss_beats_reversal() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = long_state(90.0);
        // close 89 is under the stop and every reversal condition holds
        assert_eq!(
            eval(&engine, &bearish(), &mut state),
            Ok(TradeDecision::ExitLong {
                reason: ExitReason::StopLoss
            })
        );
    }

    #[test]
    fn reversal_exit_above_stop() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = long_state(80.0);
        assert_eq!(
            eval(&engine, &bearish(), &mut state),
            Ok(TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal
            })
        );
    }

    #[test]
    fn exit_uses_its_own_adx_threshold() {
        let engine = RuleBasedSignalEngine::default();
        let mut state = long_state(80.0);
        // 22 is above entry minimum but below exit maximum
        let snap = IndicatorSnapshot {
            adx: Some(22.0),
            ..bearish()
        };
        assert!(matches!(
            eval(&engine, &snap, &mut state),
            Ok(TradeDecision::ExitLong { .. })
        ));
        let strong = IndicatorSnapshot {
            adx: Some(26.0),
            ..bearish()
        };
        assert_eq!(
            eval(&engine, &strong, &mut state),
            Ok(TradeDecision::NoAction)
        );
    }

    #[test]
    fn required_history_follows_filters() {
        let params = IndicatorParams::default();
        assert_eq!(RuleBasedSignalEngine::default().required_history(&params), 78);
        let simple = RuleBasedSignalEngine::new(RuleThresholds::conservative(), PositionSizer::default());
        assert_eq!(simple.required_history(&params), 34);
    }
}
