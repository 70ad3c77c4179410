pub mod tree;

use crate::error::InferenceError;

/// A model mapping rows of numeric features to class labels, one label per row.
pub trait Classifier: Send + Sync {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, InferenceError>;
}
