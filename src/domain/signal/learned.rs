//! Classifier-driven engine with walk-forward refitting.
//!
//! Every step appends the bar's feature row to the instrument's history and,
//! once the history is long enough, refits a random forest on every labelled
//! row before predicting whether the newest bar's successor closes higher.
//!
//! Two variants:
//! - [`LearnedVariant::Refit`]: raw features, plain refit.
//! - [`LearnedVariant::LaggedCv`]: adds lagged close/RSI columns, scales
//!   features with a scaler fitted on this refit's training rows only, and
//!   picks the tree depth by forward-chaining cross-validation.
//!
//! There is no stop-loss in this engine; entries carry no stop price.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::decision::{ExitReason, SkipReason, TradeDecision};
use crate::domain::indicator::IndicatorType;
use crate::domain::indicator::bundle::IndicatorParams;
use crate::domain::instrument_state::InstrumentState;
use crate::domain::ml::cv::{TimeSeriesSplit, select_depth};
use crate::domain::ml::{
    FeatureRow, FitError, ForestConfig, RandomForest, StandardScaler, TrainingSet,
    build_training_set,
};
use crate::domain::signal::{SignalEngine, StepInput};

#[derive(Debug, Clone, PartialEq)]
pub enum LearnedVariant {
    Refit,
    LaggedCv {
        lags: usize,
        cv_folds: usize,
        depth_grid: Vec<usize>,
    },
}

impl LearnedVariant {
    pub fn lags(&self) -> usize {
        match self {
            LearnedVariant::Refit => 0,
            LearnedVariant::LaggedCv { lags, .. } => *lags,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LearnedConfig {
    pub lookback: usize,
    pub margin: usize,
    pub forest: ForestConfig,
    pub variant: LearnedVariant,
    /// Quantity bought on an up prediction.
    pub default_order_size: f64,
    /// Feature rows kept per instrument; `None` keeps all.
    pub max_history: Option<usize>,
}

impl Default for LearnedConfig {
    fn default() -> Self {
        Self {
            lookback: 14,
            margin: 1,
            forest: ForestConfig::default(),
            variant: LearnedVariant::Refit,
            default_order_size: 1.0,
            max_history: None,
        }
    }
}

impl LearnedConfig {
    /// Feature rows that must be exceeded before fitting.
    pub fn min_rows(&self) -> usize {
        self.lookback + self.margin + self.variant.lags()
    }
}

/// The last successful fit for one instrument.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub forest: RandomForest,
    pub scaler: Option<StandardScaler>,
    pub max_depth: usize,
    pub trained_at: NaiveDateTime,
    pub n_samples: usize,
}

impl TrainedModel {
    /// Apply this fit's scaler (if any) and vote.
    pub fn predict(&self, features: &[f64]) -> Result<bool, FitError> {
        match &self.scaler {
            Some(scaler) => self.forest.predict(&scaler.transform_row(features)?),
            None => self.forest.predict(features),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LearnedSignalEngine {
    pub config: LearnedConfig,
}

impl LearnedSignalEngine {
    pub fn new(config: LearnedConfig) -> Self {
        Self { config }
    }

    fn fit(&self, set: &TrainingSet) -> Result<TrainedModel, FitError> {
        set.train.validate()?;
        let n_samples = set.train.n_samples();

        match &self.config.variant {
            LearnedVariant::Refit => {
                let forest = RandomForest::fit(self.config.forest.clone(), &set.train)?;
                Ok(TrainedModel {
                    forest,
                    scaler: None,
                    max_depth: self.config.forest.max_depth,
                    trained_at: set.latest_timestamp,
                    n_samples,
                })
            }
            LearnedVariant::LaggedCv {
                cv_folds,
                depth_grid,
                ..
            } => {
                let depth = select_depth(
                    &set.train,
                    TimeSeriesSplit::new(*cv_folds),
                    depth_grid,
                    &self.config.forest,
                )?;
                let scaler = StandardScaler::fit(&set.train.features)?;
                let mut scaled = set.train.clone();
                scaled.features = scaler.transform(&set.train.features)?;
                let config = ForestConfig {
                    max_depth: depth,
                    ..self.config.forest.clone()
                };
                let forest = RandomForest::fit(config, &scaled)?;
                Ok(TrainedModel {
                    forest,
                    scaler: Some(scaler),
                    max_depth: depth,
                    trained_at: set.latest_timestamp,
                    n_samples,
                })
            }
        }
    }
}

impl SignalEngine for LearnedSignalEngine {
    fn name(&self) -> &'static str {
        match self.config.variant {
            LearnedVariant::Refit => "learned",
            LearnedVariant::LaggedCv { .. } => "learned_lagged",
        }
    }

    fn required_history(&self, params: &IndicatorParams) -> usize {
        let warmup = [
            IndicatorType::Rsi(params.rsi_period),
            IndicatorType::Ema(params.feature_ema_period),
            IndicatorType::Macd {
                fast: params.macd_fast,
                slow: params.macd_slow,
                signal: params.macd_signal,
            },
        ]
        .iter()
        .map(IndicatorType::lookback)
        .max()
        .unwrap_or(0);
        warmup + self.config.min_rows()
    }

    fn history_capacity(&self) -> Option<usize> {
        self.config.max_history
    }

    fn evaluate(
        &self,
        input: &StepInput<'_>,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason> {
        let row = FeatureRow::from_snapshot(input.snapshot).ok_or(SkipReason::DataUnavailable)?;
        let is_new = state
            .features
            .last()
            .is_none_or(|last| row.timestamp > last.timestamp);
        if is_new {
            state.features.push(row);
        }

        let need = self.config.min_rows();
        let have = state.features.len();
        if have <= need {
            return Err(SkipReason::InsufficientHistory { have, need });
        }

        let set = build_training_set(&state.features, self.config.variant.lags())?;
        let model = self.fit(&set)?;
        let prediction = model.predict(&set.latest)?;
        debug!(
            symbol = %input.snapshot.symbol,
            timestamp = %input.snapshot.timestamp,
            samples = model.n_samples,
            depth = model.max_depth,
            prediction,
            "model refit"
        );
        state.model = Some(model);

        let decision = match (state.position.is_long(), prediction) {
            (false, true) => TradeDecision::EnterLong {
                size: self.config.default_order_size,
                stop_distance: None,
            },
            (true, false) => TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal,
            },
            _ => TradeDecision::NoAction,
        };
        Ok(decision)
    }
}
