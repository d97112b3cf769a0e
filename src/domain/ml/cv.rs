//! Forward-chaining cross-validation.
//!
//! Folds are time ordered and never shuffled: every validation block starts
//! after the end of its training block, and each training block is a prefix
//! of the data.

use std::ops::Range;

use tracing::debug;

use crate::domain::ml::{Dataset, FitError, ForestConfig, RandomForest, StandardScaler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

/// Expanding-window splitter: `n_splits` validation blocks of equal size
/// following a growing training prefix.
#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesSplit {
    pub n_splits: usize,
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// Folds for `n_samples` rows. Empty when there are too few rows.
    pub fn folds(&self, n_samples: usize) -> Vec<Fold> {
        if self.n_splits == 0 {
            return Vec::new();
        }
        let block = n_samples / (self.n_splits + 1);
        if block == 0 {
            return Vec::new();
        }
        let first_train_end = n_samples - self.n_splits * block;
        (0..self.n_splits)
            .map(|k| {
                let train_end = first_train_end + k * block;
                Fold {
                    train: 0..train_end,
                    validation: train_end..train_end + block,
                }
            })
            .collect()
    }
}

/// Mean validation accuracy of one forest configuration across `folds`.
///
/// Each fold fits its own scaler on the fold's training rows. Folds whose
/// training block holds a single class are skipped; `None` if none scored.
pub fn cross_validate(
    dataset: &Dataset,
    folds: &[Fold],
    config: &ForestConfig,
) -> Result<Option<f64>, FitError> {
    let mut scores = Vec::new();
    for fold in folds {
        let train_idx: Vec<usize> = fold.train.clone().collect();
        let valid_idx: Vec<usize> = fold.validation.clone().collect();
        let mut train = dataset.subset(&train_idx);
        let mut valid = dataset.subset(&valid_idx);
        if !train.has_both_classes() || valid.n_samples() == 0 {
            continue;
        }

        let scaler = StandardScaler::fit(&train.features)?;
        train.features = scaler.transform(&train.features)?;
        valid.features = scaler.transform(&valid.features)?;

        let forest = RandomForest::fit(config.clone(), &train)?;
        scores.push(forest.accuracy(&valid)?);
    }
    if scores.is_empty() {
        return Ok(None);
    }
    Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
}

/// Pick the tree depth with the best forward-chained accuracy.
///
/// Ties keep the earlier grid entry. Falls back to `base.max_depth` when the
/// grid is empty or no fold could be scored.
pub fn select_depth(
    dataset: &Dataset,
    splitter: TimeSeriesSplit,
    depth_grid: &[usize],
    base: &ForestConfig,
) -> Result<usize, FitError> {
    let folds = splitter.folds(dataset.n_samples());
    let mut best: Option<(usize, f64)> = None;
    for &depth in depth_grid {
        let config = ForestConfig {
            max_depth: depth,
            ..base.clone()
        };
        if let Some(score) = cross_validate(dataset, &folds, &config)? {
            debug!(depth, score, "cross-validated depth");
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((depth, score));
            }
        }
    }
    Ok(best.map_or(base.max_depth, |(depth, _)| depth))
}
