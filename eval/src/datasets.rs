// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Transaction dataset loading, synthesis and export

use crate::error::{FraudError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;

/// Default name of the label column in transaction tables
pub const DEFAULT_LABEL_COLUMN: &str = "Class";

/// Binary label for a card transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// Legitimate transaction (code 0)
    Legitimate,
    /// Fraudulent transaction (code 1)
    Fraud,
}

impl Label {
    /// Both labels in confusion-matrix order
    pub const ALL: [Label; 2] = [Label::Legitimate, Label::Fraud];

    /// Numeric code used in data files (1 = fraud, 0 = legitimate)
    pub fn to_binary(&self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Fraud => 1,
        }
    }

    pub fn from_binary(value: u8) -> Option<Self> {
        match value {
            0 => Some(Label::Legitimate),
            1 => Some(Label::Fraud),
            _ => None,
        }
    }

    /// Parse a label cell; accepts `0`/`1` and their float spellings
    pub fn parse(raw: &str) -> Option<Self> {
        let value: f64 = raw.trim().parse().ok()?;
        if value == 0.0 {
            Some(Label::Legitimate)
        } else if value == 1.0 {
            Some(Label::Fraud)
        } else {
            None
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Label::Legitimate => Label::Fraud,
            Label::Fraud => Label::Legitimate,
        }
    }

    pub fn index(&self) -> usize {
        self.to_binary() as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Legitimate => write!(f, "Legitimate"),
            Label::Fraud => write!(f, "Fraud"),
        }
    }
}

/// A single labeled transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Data-row index in the source table
    pub id: usize,
    /// Numeric features in column order
    pub features: Vec<f64>,
    /// Ground truth label
    pub label: Label,
}

/// Per-label row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub legitimate: usize,
    pub fraud: usize,
}

impl LabelCounts {
    pub fn get(&self, label: Label) -> usize {
        match label {
            Label::Legitimate => self.legitimate,
            Label::Fraud => self.fraud,
        }
    }

    pub fn total(&self) -> usize {
        self.legitimate + self.fraud
    }

    /// Share of fraud rows, 0.0 for an empty count
    pub fn fraud_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.fraud as f64 / total as f64
    }
}

/// Pairwise Pearson correlations between the feature columns and the label
///
/// A pair involving a constant column has no correlation and is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }

    /// Markdown table, two decimals per cell
    pub fn to_markdown(&self) -> String {
        let mut out = format!("| | {} |\n", self.columns.join(" | "));
        out.push_str(&format!("|---|{}\n", "---|".repeat(self.columns.len())));
        for (name, row) in self.columns.iter().zip(&self.values) {
            let cells: Vec<String> = row
                .iter()
                .map(|v| v.map_or("-".to_string(), |v| format!("{:+.2}", v)))
                .collect();
            out.push_str(&format!("| **{}** | {} |\n", name, cells.join(" | ")));
        }
        out
    }
}

/// Parameters for generating a synthetic transaction table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub rows: usize,
    /// Fraction of rows labeled fraud
    pub fraud_rate: f64,
    pub n_features: usize,
    /// Mean offset of fraud rows on each feature
    pub separation: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: 2000,
            fraud_rate: 0.05,
            n_features: 8,
            separation: 1.5,
        }
    }
}

/// An ordered, non-empty collection of labeled transactions
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub feature_names: Vec<String>,
    pub label_column: String,
    pub records: Vec<Transaction>,
}

impl Dataset {
    /// Build a dataset from already-parsed records
    pub fn from_records(
        name: &str,
        feature_names: Vec<String>,
        label_column: &str,
        records: Vec<Transaction>,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(FraudError::EmptyDataset);
        }
        if let Some(bad) = records.iter().find(|r| r.features.len() != feature_names.len()) {
            return Err(FraudError::Input {
                reason: format!(
                    "record {} has {} features, header declares {}",
                    bad.id,
                    bad.features.len(),
                    feature_names.len()
                ),
            });
        }
        Ok(Self {
            name: name.to_string(),
            feature_names,
            label_column: label_column.to_string(),
            records,
        })
    }

    /// Same schema, different rows. Callers guarantee the rows came from `self`.
    pub(crate) fn with_records(&self, name: &str, records: Vec<Transaction>) -> Self {
        Self {
            name: name.to_string(),
            feature_names: self.feature_names.clone(),
            label_column: self.label_column.clone(),
            records,
        }
    }

    /// Load a delimited transaction table with a header row
    pub fn load_csv(path: &Path, label_column: &str) -> Result<Self> {
        if !path.exists() {
            return Err(FraudError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

        let headers = reader.headers()?.clone();
        let label_idx = headers
            .iter()
            .position(|h| h.trim() == label_column)
            .ok_or_else(|| FraudError::MissingLabelColumn {
                column: label_column.to_string(),
            })?;

        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != label_idx)
            .map(|(_, h)| h.trim().to_string())
            .collect();

        if feature_names.is_empty() {
            return Err(FraudError::Input {
                reason: format!("{} has no feature columns", path.display()),
            });
        }

        let mut records = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let record = result?;

            let raw_label = record.get(label_idx).unwrap_or("");
            let label = Label::parse(raw_label).ok_or_else(|| FraudError::InvalidLabel {
                row: idx,
                value: raw_label.to_string(),
            })?;

            let mut features = Vec::with_capacity(feature_names.len());
            for (col, cell) in record.iter().enumerate() {
                if col == label_idx {
                    continue;
                }
                let value = cell
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| FraudError::InvalidValue {
                        row: idx,
                        column: headers.get(col).unwrap_or("?").trim().to_string(),
                        value: cell.to_string(),
                    })?;
                features.push(value);
            }

            records.push(Transaction {
                id: idx,
                features,
                label,
            });
        }

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "transactions".to_string());

        let dataset = Self::from_records(&name, feature_names, label_column, records)?;
        let counts = dataset.label_counts();
        tracing::info!(
            "Loaded {} rows with {} features from {} (legitimate={}, fraud={})",
            dataset.len(),
            dataset.n_features(),
            path.display(),
            counts.legitimate,
            counts.fraud
        );
        if counts.fraud == 0 || counts.legitimate == 0 {
            tracing::warn!("Transaction table {} contains a single class", path.display());
        }

        Ok(dataset)
    }

    /// Write the dataset as CSV, label column last. Parent directories are created.
    pub fn save_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;

        let mut header = self.feature_names.clone();
        header.push(self.label_column.clone());
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row: Vec<String> = record.features.iter().map(|v| v.to_string()).collect();
            row.push(record.label.to_binary().to_string());
            writer.write_record(&row)?;
        }
        writer.flush()?;

        tracing::info!("Wrote {} rows to {}", self.len(), path.display());
        Ok(())
    }

    /// Generate Gaussian transactions where fraud rows are shifted by `separation`
    pub fn synthetic(config: &SyntheticConfig, seed: u64) -> Result<Self> {
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        if config.rows == 0 {
            return Err(FraudError::config("synthetic dataset needs at least one row"));
        }
        if config.n_features == 0 {
            return Err(FraudError::config("synthetic dataset needs at least one feature"));
        }
        if !(0.0..=1.0).contains(&config.fraud_rate) {
            return Err(FraudError::config(format!(
                "fraud rate {} outside [0, 1]",
                config.fraud_rate
            )));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let n_fraud = (config.rows as f64 * config.fraud_rate).round() as usize;
        let mut labels: Vec<Label> = (0..config.rows)
            .map(|i| if i < n_fraud { Label::Fraud } else { Label::Legitimate })
            .collect();
        labels.shuffle(&mut rng);

        // Alternate the direction of the shift so no single feature carries the signal
        let shifts: Vec<f64> = (0..config.n_features)
            .map(|j| if j % 2 == 0 { config.separation } else { -config.separation })
            .collect();

        let records = labels
            .into_iter()
            .enumerate()
            .map(|(id, label)| {
                let features = shifts
                    .iter()
                    .map(|shift| {
                        // Box-Muller
                        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                        let u2: f64 = rng.gen();
                        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                        if label == Label::Fraud {
                            z + shift
                        } else {
                            z
                        }
                    })
                    .collect();
                Transaction { id, features, label }
            })
            .collect();

        let feature_names = (1..=config.n_features).map(|i| format!("V{}", i)).collect();

        Self::from_records("synthetic", feature_names, DEFAULT_LABEL_COLUMN, records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// Pearson correlation of every feature pair, with the label as the last column
    pub fn correlation_matrix(&self) -> CorrelationMatrix {
        let d = self.n_features() + 1;
        let mut x = Array2::<f64>::zeros((self.len(), d));
        for (mut row, record) in x.outer_iter_mut().zip(&self.records) {
            for (cell, value) in row.iter_mut().zip(&record.features) {
                *cell = *value;
            }
            row[d - 1] = record.label.to_binary() as f64;
        }

        let mean = x.sum_axis(Axis(0)) / self.len() as f64;
        let centered = &x - &mean;
        let covariance = centered.t().dot(&centered);
        let spread: Vec<f64> = covariance.diag().iter().map(|v| v.sqrt()).collect();

        let values = (0..d)
            .map(|i| {
                (0..d)
                    .map(|j| {
                        let denom = spread[i] * spread[j];
                        // Constant columns have no defined correlation
                        if denom <= 1e-12 * covariance[[i, i]].max(covariance[[j, j]]).max(1.0) {
                            None
                        } else {
                            Some((covariance[[i, j]] / denom).clamp(-1.0, 1.0))
                        }
                    })
                    .collect()
            })
            .collect();

        let mut columns = self.feature_names.clone();
        columns.push(self.label_column.clone());

        CorrelationMatrix { columns, values }
    }

    pub fn label_counts(&self) -> LabelCounts {
        let mut counts = LabelCounts::default();
        for record in &self.records {
            match record.label {
                Label::Legitimate => counts.legitimate += 1,
                Label::Fraud => counts.fraud += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_correlation_matrix() {
        // b = 2a + 1, c = -a, d and the label follow the same +-1 pattern, which is orthogonal to a
        let rows = [
            ([1.0, 3.0, -1.0, 1.0, 5.0], Label::Fraud),
            ([2.0, 5.0, -2.0, -1.0, 5.0], Label::Legitimate),
            ([3.0, 7.0, -3.0, -1.0, 5.0], Label::Legitimate),
            ([4.0, 9.0, -4.0, 1.0, 5.0], Label::Fraud),
        ];
        let records = rows
            .iter()
            .enumerate()
            .map(|(id, (features, label))| Transaction {
                id,
                features: features.to_vec(),
                label: *label,
            })
            .collect();
        let names = ["a", "b", "c", "d", "constant"].iter().map(|s| s.to_string()).collect();
        let dataset = Dataset::from_records("t", names, "Class", records).unwrap();

        let corr = dataset.correlation_matrix();
        assert_eq!(corr.columns.last().map(String::as_str), Some("Class"));

        let close = |a: &str, b: &str, expected: f64| {
            let value = corr.get(a, b).unwrap();
            assert!((value - expected).abs() < 1e-12, "{a}/{b}: {value}");
        };
        close("a", "a", 1.0);
        close("a", "b", 1.0);
        close("a", "c", -1.0);
        close("a", "d", 0.0);
        close("d", "Class", 1.0);
        close("Class", "a", 0.0);
        assert_eq!(corr.get("a", "constant"), None);
        assert_eq!(corr.get("constant", "constant"), None);

        let table = corr.to_markdown();
        assert!(table.contains("| **c** | -1.00 | -1.00 | +1.00 |"));
        assert!(table.contains(" - |"));
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(Label::parse("0"), Some(Label::Legitimate));
        assert_eq!(Label::parse("1"), Some(Label::Fraud));
        assert_eq!(Label::parse(" 1.0 "), Some(Label::Fraud));
        assert_eq!(Label::parse("2"), None);
        assert_eq!(Label::parse("fraud"), None);
        assert_eq!(Label::Fraud.to_string(), "Fraud");
        assert_eq!(Label::from_binary(0), Some(Label::Legitimate));
        assert_eq!(Label::from_binary(7), None);
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "creditcard.csv",
            "Time,V1,Amount,Class\n0,-1.35,149.62,0\n1,1.19,2.69,\"1\"\n2,0.5,10.0,0\n",
        );

        let dataset = Dataset::load_csv(&path, "Class").unwrap();
        assert_eq!(dataset.name, "creditcard");
        assert_eq!(dataset.feature_names, vec!["Time", "V1", "Amount"]);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.records[1].features, vec![1.0, 1.19, 2.69]);
        assert_eq!(dataset.records[1].label, Label::Fraud);
        assert_eq!(dataset.label_counts(), LabelCounts { legitimate: 2, fraud: 1 });
    }

    #[test]
    fn test_label_column_anywhere() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "is_fraud,a,b\n1,0.1,0.2\n0,0.3,0.4\n");

        let dataset = Dataset::load_csv(&path, "is_fraud").unwrap();
        assert_eq!(dataset.feature_names, vec!["a", "b"]);
        assert_eq!(dataset.records[0].features, vec![0.1, 0.2]);
        assert_eq!(dataset.records[0].label, Label::Fraud);
    }

    #[test]
    fn test_missing_file() {
        let err = Dataset::load_csv(Path::new("/nonexistent/creditcard.csv"), "Class").unwrap_err();
        assert!(matches!(err, FraudError::InputNotFound { .. }));
    }

    #[test]
    fn test_missing_label_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "a,b\n1,2\n");
        let err = Dataset::load_csv(&path, "Class").unwrap_err();
        assert!(matches!(err, FraudError::MissingLabelColumn { ref column } if column == "Class"));
    }

    #[test]
    fn test_non_numeric_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "t.csv", "a,b,Class\n1,2,0\n1,abc,1\n");
        let err = Dataset::load_csv(&path, "Class").unwrap_err();
        match err {
            FraudError::InvalidValue { row, column, value } => {
                assert_eq!(row, 1);
                assert_eq!(column, "b");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_label_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(dir.path(), "bad.csv", "a,Class\n1,3\n");
        assert!(matches!(
            Dataset::load_csv(&bad, "Class").unwrap_err(),
            FraudError::InvalidLabel { row: 0, .. }
        ));

        let empty = write_file(dir.path(), "empty.csv", "a,Class\n");
        assert!(matches!(
            Dataset::load_csv(&empty, "Class").unwrap_err(),
            FraudError::EmptyDataset
        ));
    }

    #[test]
    fn test_save_csv_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = Dataset::synthetic(&SyntheticConfig { rows: 50, ..Default::default() }, 7).unwrap();
        let path = dir.path().join("processed").join("processed_data.csv");

        dataset.save_csv(&path).unwrap();
        let reloaded = Dataset::load_csv(&path, DEFAULT_LABEL_COLUMN).unwrap();

        assert_eq!(reloaded.feature_names, dataset.feature_names);
        assert_eq!(reloaded.labels(), dataset.labels());
        for (a, b) in reloaded.records.iter().zip(dataset.records.iter()) {
            assert_eq!(a.features, b.features);
        }
    }

    #[test]
    fn test_synthetic_dataset() {
        let config = SyntheticConfig {
            rows: 1000,
            fraud_rate: 0.1,
            n_features: 4,
            separation: 2.0,
        };
        let dataset = Dataset::synthetic(&config, 42).unwrap();

        assert_eq!(dataset.len(), 1000);
        assert_eq!(dataset.n_features(), 4);
        assert_eq!(dataset.label_counts().fraud, 100);
        assert_eq!(dataset, Dataset::synthetic(&config, 42).unwrap());
        assert!(Dataset::synthetic(&SyntheticConfig { rows: 0, ..config }, 1).is_err());
    }

    #[test]
    fn test_from_records_rejects_ragged_rows() {
        let records = vec![
            Transaction { id: 0, features: vec![1.0, 2.0], label: Label::Fraud },
            Transaction { id: 1, features: vec![1.0], label: Label::Legitimate },
        ];
        let err = Dataset::from_records("t", vec!["a".into(), "b".into()], "Class", records).unwrap_err();
        assert!(matches!(err, FraudError::Input { .. }));
    }
}
