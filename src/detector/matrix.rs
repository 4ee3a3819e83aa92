//! Row-major feature matrix built from telemetry feature vectors

use crate::error::{ModelError, ModelResult};

/// Training input: one row per record, all rows the same width, all values finite.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: Vec<Vec<f64>>,
    n_features: usize,
}

impl FeatureMatrix {
    /// Build a matrix, rejecting ragged rows and non-finite values.
    ///
    /// An empty row list (or zero-width rows) is accepted here; the ensemble
    /// build rejects it as a configuration problem.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> ModelResult<Self> {
        let n_features = rows.first().map(Vec::len).unwrap_or(0);

        for (index, row) in rows.iter().enumerate() {
            if row.len() != n_features {
                return Err(ModelError::validation(format!(
                    "records[{}].feature_vector has {} values, expected {} (inconsistent feature vector lengths)",
                    index,
                    row.len(),
                    n_features
                )));
            }
            ensure_finite(row, &format!("records[{}].feature_vector", index))?;
        }

        Ok(Self { rows, n_features })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.n_features == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Reject NaN and ±∞ in a feature vector
pub fn ensure_finite(values: &[f64], field: &str) -> ModelResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(ModelError::validation(format!(
            "{}[{}] is not a finite number",
            field, pos
        ))),
        None => Ok(()),
    }
}
