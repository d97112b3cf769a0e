//! Zero-mean, unit-variance feature scaling.

use crate::domain::ml::FitError;

/// Per-column mean and population standard deviation learned from one fit.
///
/// Constant columns get a scale of 1.0 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, FitError> {
        let first = rows.first().ok_or(FitError::EmptyTrainingSet)?;
        let width = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; width];
        for row in rows {
            if row.len() != width {
                return Err(FitError::ShapeMismatch {
                    expected: width,
                    got: row.len(),
                });
            }
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut scales {
            let std = (*s / n).sqrt();
            *s = if std > 0.0 { std } else { 1.0 };
        }

        Ok(Self { means, scales })
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, FitError> {
        if row.len() != self.means.len() {
            return Err(FitError::ShapeMismatch {
                expected: self.means.len(),
                got: row.len(),
            });
        }
        Ok(row
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, FitError> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}
