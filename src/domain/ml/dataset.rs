//! Feature rows and training-set construction.
//!
//! A training set is derived from the ordered feature history of one
//! instrument. Row `i` is labelled `close[i + 1] > close[i]`, so the newest
//! row has no label yet: it is never trained on and is the row the model
//! predicts.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use rand::Rng;

use crate::domain::indicator::bundle::IndicatorSnapshot;
use crate::domain::ml::FitError;

pub const BASE_FEATURES: [&str; 8] = ["close", "open", "high", "low", "volume", "rsi", "macd", "ema"];

/// One bar of model inputs for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub rsi: f64,
    pub macd: f64,
    pub ema: f64,
}

impl FeatureRow {
    /// `None` while any of the model's indicators is still warming up, or
    /// when any value is not finite.
    pub fn from_snapshot(snap: &IndicatorSnapshot) -> Option<Self> {
        let row = Self {
            timestamp: snap.timestamp,
            close: snap.close,
            open: snap.open,
            high: snap.high,
            low: snap.low,
            volume: snap.volume,
            rsi: snap.rsi?,
            macd: snap.macd_line?,
            ema: snap.ema_feature?,
        };
        row.base_values().iter().all(|v| v.is_finite()).then_some(row)
    }

    fn base_values(&self) -> [f64; 8] {
        [
            self.close,
            self.open,
            self.high,
            self.low,
            self.volume,
            self.rsi,
            self.macd,
            self.ema,
        ]
    }
}

/// Append-only feature history with optional oldest-first eviction.
#[derive(Debug, Clone, Default)]
pub struct FeatureHistory {
    rows: VecDeque<FeatureRow>,
    capacity: Option<usize>,
}

impl FeatureHistory {
    /// `capacity` of `None` keeps every row.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            rows: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, row: FeatureRow) {
        self.rows.push_back(row);
        if let Some(cap) = self.capacity {
            while self.rows.len() > cap {
                self.rows.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&FeatureRow> {
        self.rows.back()
    }

    pub fn rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.rows.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
    pub timestamps: Vec<NaiveDateTime>,
}

impl Dataset {
    pub fn n_samples(&self) -> usize {
        self.features.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Create a subset of the dataset by indices
    pub fn subset(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            timestamps: indices.iter().map(|&i| self.timestamps[i]).collect(),
        }
    }

    /// Random sample with replacement, same size as the dataset.
    pub fn bootstrap_sample<R: Rng>(&self, rng: &mut R) -> Dataset {
        let n = self.n_samples();
        if n == 0 {
            return self.clone();
        }
        let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        self.subset(&indices)
    }

    pub fn positive_count(&self) -> usize {
        self.labels.iter().filter(|&&y| y).count()
    }

    pub fn has_both_classes(&self) -> bool {
        let pos = self.positive_count();
        pos > 0 && pos < self.labels.len()
    }

    /// Checks the set is fit-able: non-empty, rectangular, finite, two classes.
    pub fn validate(&self) -> Result<(), FitError> {
        if self.features.is_empty() {
            return Err(FitError::EmptyTrainingSet);
        }
        let width = self.n_features();
        for (row, values) in self.features.iter().enumerate() {
            if values.len() != width {
                return Err(FitError::ShapeMismatch {
                    expected: width,
                    got: values.len(),
                });
            }
            if let Some(column) = values.iter().position(|v| !v.is_finite()) {
                return Err(FitError::NonFiniteFeature { row, column });
            }
        }
        if !self.has_both_classes() {
            return Err(FitError::SingleClass);
        }
        Ok(())
    }
}

/// Labelled rows plus the unlabelled newest row to predict on.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub train: Dataset,
    pub latest: Vec<f64>,
    pub latest_timestamp: NaiveDateTime,
}

pub fn feature_names(lags: usize) -> Vec<String> {
    let mut names: Vec<String> = BASE_FEATURES.iter().map(|s| s.to_string()).collect();
    for k in 1..=lags {
        names.push(format!("close_lag_{}", k));
    }
    for k in 1..=lags {
        names.push(format!("rsi_lag_{}", k));
    }
    names
}

/// Build X, y from the history, with `lags` lagged close/RSI columns.
///
/// The first `lags` rows only serve as lag sources. The last row is returned
/// as `latest` and is never part of `train`.
pub fn build_training_set(history: &FeatureHistory, lags: usize) -> Result<TrainingSet, FitError> {
    let rows: Vec<&FeatureRow> = history.rows().collect();
    if rows.len() <= lags + 1 {
        return Err(FitError::EmptyTrainingSet);
    }

    let feature_row = |i: usize| -> Vec<f64> {
        let mut values = rows[i].base_values().to_vec();
        values.extend((1..=lags).map(|k| rows[i - k].close));
        values.extend((1..=lags).map(|k| rows[i - k].rsi));
        values
    };

    let last = rows.len() - 1;
    let mut train = Dataset {
        feature_names: feature_names(lags),
        ..Dataset::default()
    };
    for i in lags..last {
        train.features.push(feature_row(i));
        train.labels.push(rows[i + 1].close > rows[i].close);
        train.timestamps.push(rows[i].timestamp);
    }

    Ok(TrainingSet {
        train,
        latest: feature_row(last),
        latest_timestamp: rows[last].timestamp,
    })
}
