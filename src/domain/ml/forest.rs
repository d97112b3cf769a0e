//! Bootstrap-aggregated random forest classifier.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::domain::ml::tree::{DecisionTree, TreeConfig};
use crate::domain::ml::{Dataset, FitError};

/// Random Forest configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features per split (ceil(sqrt(n)) if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest. The training set must pass [`Dataset::validate`].
    pub fn fit(config: ForestConfig, dataset: &Dataset) -> Result<Self, FitError> {
        dataset.validate()?;
        let n_features = dataset.n_features();
        let max_features = config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().ceil() as usize);

        let tree_config = TreeConfig {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: Some(max_features),
        };

        let trees = (0..config.n_trees.max(1))
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(i as u64));
                let mut tree = DecisionTree::new(tree_config.clone());
                if config.bootstrap {
                    let sample = dataset.bootstrap_sample(&mut rng);
                    tree.fit(&sample, &mut rng);
                } else {
                    tree.fit(dataset, &mut rng);
                }
                tree
            })
            .collect();

        Ok(Self {
            config,
            trees,
            n_features,
        })
    }

    /// Fraction of trees voting for the positive class.
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, FitError> {
        if features.len() != self.n_features {
            return Err(FitError::ShapeMismatch {
                expected: self.n_features,
                got: features.len(),
            });
        }
        let votes = self.trees.iter().filter(|t| t.predict(features)).count();
        Ok(votes as f64 / self.trees.len() as f64)
    }

    /// Majority vote; ties predict down.
    pub fn predict(&self, features: &[f64]) -> Result<bool, FitError> {
        Ok(self.predict_proba(features)? > 0.5)
    }

    /// Fraction of rows predicted correctly.
    pub fn accuracy(&self, dataset: &Dataset) -> Result<f64, FitError> {
        if dataset.n_samples() == 0 {
            return Err(FitError::EmptyTrainingSet);
        }
        let mut correct = 0;
        for (x, &y) in dataset.features.iter().zip(&dataset.labels) {
            if self.predict(x)? == y {
                correct += 1;
            }
        }
        Ok(correct as f64 / dataset.n_samples() as f64)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }
}
