//! Tabular datasets loaded from CSV and split for training.

use csv::ReaderBuilder;
use pd_types::EvaluationError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Column selection for CSV loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvOptions {
    /// Label column.
    pub target: String,
    /// Columns excluded from the features.
    pub drop: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            target: "temp".to_string(),
            drop: vec!["device".to_string()],
        }
    }
}

/// Dense numeric features with one label per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        rows: Vec<Vec<f64>>,
        labels: Vec<f64>,
    ) -> Result<Self, EvaluationError> {
        if rows.len() != labels.len() {
            return Err(EvaluationError::LengthMismatch {
                predictions: rows.len(),
                labels: labels.len(),
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != feature_names.len()) {
            return Err(EvaluationError::LoadingFailed {
                message: format!(
                    "row has {} values, expected {} features",
                    row.len(),
                    feature_names.len()
                ),
            });
        }

        Ok(Self {
            feature_names,
            rows,
            labels,
        })
    }

    /// Load a headered CSV file. Empty feature cells load as NaN and are
    /// imputed later by the preprocessor; labels must be present and numeric.
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        options: &CsvOptions,
    ) -> Result<Self, EvaluationError> {
        let path = path.as_ref();
        tracing::info!("Loading CSV data from: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| EvaluationError::LoadingFailed {
            message: format!("Failed to open CSV file {}: {}", path.display(), e),
        })?;
        let dataset = Self::from_reader(file, options)?;

        tracing::info!(
            "Loaded {} rows with {} features from {}",
            dataset.len(),
            dataset.n_features(),
            path.display()
        );
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Self, EvaluationError> {
        let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| EvaluationError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();

        let target_idx = headers
            .iter()
            .position(|h| h.trim() == options.target)
            .ok_or_else(|| EvaluationError::ColumnNotFound {
                column: options.target.clone(),
            })?;

        for dropped in &options.drop {
            if !headers.iter().any(|h| h.trim() == dropped) {
                tracing::warn!("Drop column '{}' not present in CSV headers", dropped);
            }
        }

        let feature_cols: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != target_idx && !options.drop.iter().any(|d| d == h.trim()))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut rows = Vec::new();
        let mut labels = Vec::new();

        for (record_idx, result) in rdr.records().enumerate() {
            let line = record_idx + 2;
            let record = result.map_err(|e| EvaluationError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line, e),
            })?;

            let label_cell = record.get(target_idx).unwrap_or("").trim();
            let label = label_cell
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| EvaluationError::NonNumeric {
                    column: options.target.clone(),
                    line,
                })?;

            let row = feature_cols
                .iter()
                .map(|(idx, name)| {
                    let cell = record.get(*idx).unwrap_or("").trim();
                    if cell.is_empty() {
                        return Ok(f64::NAN);
                    }
                    cell.parse::<f64>().map_err(|_| EvaluationError::NonNumeric {
                        column: name.clone(),
                        line,
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;

            rows.push(row);
            labels.push(label);
        }

        Self::new(
            feature_cols.into_iter().map(|(_, name)| name).collect(),
            rows,
            labels,
        )
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Rows at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Shuffled train/validation split. The validation share is rounded up.
    pub fn split(&self, test_fraction: f64, seed: u64) -> DataSplit {
        let mut indices: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let n_test = ((self.len() as f64) * test_fraction.clamp(0.0, 1.0)).ceil() as usize;
        let (test_idx, train_idx) = indices.split_at(n_test.min(self.len()));

        DataSplit {
            train: self.subset(train_idx),
            validation: self.subset(test_idx),
        }
    }

    fn check(&self, split: &'static str) -> Result<(), EvaluationError> {
        if self.is_empty() {
            return Err(EvaluationError::EmptySplit { split });
        }
        if let Some(row) = self.labels.iter().position(|l| !l.is_finite()) {
            return Err(EvaluationError::NonFiniteLabel { split, row });
        }
        Ok(())
    }
}

/// Training rows plus the held-out rows used for scoring and early stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSplit {
    pub train: Dataset,
    pub validation: Dataset,
}

impl DataSplit {
    /// Both halves must be non-empty with finite labels.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        self.train.check("train")?;
        self.validation.check("validation")?;
        if self.train.n_features() != self.validation.n_features() {
            return Err(EvaluationError::LoadingFailed {
                message: format!(
                    "train has {} features but validation has {}",
                    self.train.n_features(),
                    self.validation.n_features()
                ),
            });
        }
        Ok(())
    }
}
