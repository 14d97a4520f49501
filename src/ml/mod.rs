/*!
 * # Machine Learning Module
 *
 * Inference over externally trained artifacts. A [`Preprocessor`] turns
 * validated sales records into a dense numeric [`FeatureMatrix`]; a
 * [`RevenueModel`] maps that matrix to one raw revenue score per row.
 *
 * Both stages are traits so the prediction service can be driven by the
 * bundled JSON artifact formats or by any other implementation.
 */

use crate::errors::ServiceError;
use crate::models::SalesRecord;

/// Column transformer (scaling, one-hot encoding, date parts)
pub mod preprocessor;

/// Gradient-boosted regression tree ensemble
pub mod gradient_boosting;

/// Loading artifacts from disk
pub mod artifacts;

pub use artifacts::{load_model, load_preprocessor};
pub use gradient_boosting::{Objective, TreeEnsembleModel};
pub use preprocessor::{ColumnPreprocessor, DatePart};

/// Fitted feature transformation. Must be deterministic and return exactly
/// one row per input record.
pub trait Preprocessor: Send + Sync {
    fn transform(&self, records: &[SalesRecord]) -> Result<FeatureMatrix, ServiceError>;

    /// Width of every row produced by [`Preprocessor::transform`]
    fn n_features_out(&self) -> usize;
}

/// Fitted regressor. Must return exactly one score per matrix row.
pub trait RevenueModel: Send + Sync {
    fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ServiceError>;

    /// Width of the feature rows the model was trained on
    fn n_features(&self) -> usize;

    fn kind(&self) -> &'static str;
}

/// Row-major dense matrix of model inputs
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_rows: usize,
    n_cols: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    pub fn with_capacity(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows: 0,
            n_cols,
            values: Vec::with_capacity(n_rows * n_cols),
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, ServiceError> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut matrix = Self::with_capacity(rows.len(), n_cols);
        for row in &rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), ServiceError> {
        if row.len() != self.n_cols {
            return Err(ServiceError::TransformError(format!(
                "feature row has {} values, expected {}",
                row.len(),
                self.n_cols
            )));
        }
        self.values.extend_from_slice(row);
        self.n_rows += 1;
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        (index < self.n_rows).then(|| &self.values[index * self.n_cols..(index + 1) * self.n_cols])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| &self.values[i * self.n_cols..(i + 1) * self.n_cols])
    }
}
