//! Gini-impurity binary classification tree.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::domain::ml::Dataset;

#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    /// Maximum depth of tree
    pub max_depth: usize,
    /// Minimum samples required to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf node
    pub min_samples_leaf: usize,
    /// Maximum features to consider per split (None = all)
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_samples_split: 4,
            min_samples_leaf: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        /// Fraction of positive labels that reached this leaf.
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    config: TreeConfig,
    root: Option<Node>,
}

impl DecisionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self { config, root: None }
    }

    pub fn fit(&mut self, dataset: &Dataset, rng: &mut ChaCha8Rng) {
        let indices: Vec<usize> = (0..dataset.n_samples()).collect();
        self.root = Some(self.build(dataset, &indices, 0, rng));
    }

    fn build(
        &self,
        dataset: &Dataset,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| dataset.labels[i]).count();
        let positive = if n == 0 {
            0.5
        } else {
            positives as f64 / n as f64
        };

        if depth >= self.config.max_depth
            || n < self.config.min_samples_split
            || positives == 0
            || positives == n
        {
            return Node::Leaf { positive };
        }

        match self.best_split(dataset, indices, positives, rng) {
            Some(split) => Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(self.build(dataset, &split.left, depth + 1, rng)),
                right: Box::new(self.build(dataset, &split.right, depth + 1, rng)),
            },
            None => Node::Leaf { positive },
        }
    }

    fn best_split(
        &self,
        dataset: &Dataset,
        indices: &[usize],
        positives: usize,
        rng: &mut ChaCha8Rng,
    ) -> Option<BestSplit> {
        let n_features = dataset.n_features();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);
        features.truncate(self.config.max_features.unwrap_or(n_features).max(1));

        let n = indices.len();
        let min_leaf = self.config.min_samples_leaf.max(1);
        let parent = gini(positives, n);
        let mut best_gain = 0.0;
        let mut best: Option<(usize, f64)> = None;

        for &feature in &features {
            let mut column: Vec<(f64, bool)> = indices
                .iter()
                .map(|&i| (dataset.features[i][feature], dataset.labels[i]))
                .collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0;
            for j in 0..n - 1 {
                if column[j].1 {
                    left_pos += 1;
                }
                let n_left = j + 1;
                let n_right = n - n_left;
                if column[j].0 == column[j + 1].0 || n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let weighted = (n_left as f64 * gini(left_pos, n_left)
                    + n_right as f64 * gini(positives - left_pos, n_right))
                    / n as f64;
                let gain = parent - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature, (column[j].0 + column[j + 1].0) / 2.0));
                }
            }
        }

        let (feature, threshold) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| dataset.features[i][feature] <= threshold);
        Some(BestSplit {
            feature,
            threshold,
            left,
            right,
        })
    }

    /// Probability of the positive class. 0.5 before fitting.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let mut node = match &self.root {
            Some(node) => node,
            None => return 0.5,
        };
        loop {
            match node {
                Node::Leaf { positive } => return *positive,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if value <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict(&self, features: &[f64]) -> bool {
        self.predict_proba(features) > 0.5
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}
