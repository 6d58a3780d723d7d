// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for the training, evaluation and scoring pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FraudError>;

/// Coarse classification of a failure, used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing input data
    Input,
    /// Invalid split fraction, absent class, mismatched schema
    Configuration,
    /// Solver divergence or degenerate inputs
    Numerical,
    /// Model file missing or unreadable
    Persistence,
}

#[derive(Error, Debug)]
pub enum FraudError {
    #[error("Input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Label column '{column}' not present in header")]
    MissingLabelColumn { column: String },

    #[error("Invalid value '{value}' for {column} at row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid value '{value}' for {field}")]
    InvalidField { field: String, value: String },

    #[error("Invalid label '{value}' at row {row} (expected 0 or 1)")]
    InvalidLabel { row: usize, value: String },

    #[error("Dataset contains no rows")]
    EmptyDataset,

    #[error("Feature vector has {actual} values, model expects {expected}")]
    FeatureWidth { expected: usize, actual: usize },

    #[error("Invalid input: {reason}")]
    Input { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("Class {label} is absent from the {split} split")]
    ClassAbsent { label: String, split: String },

    #[error("Numerical failure: {reason}")]
    Numerical { reason: String },

    #[error("Solver did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("Model not found: {}", path.display())]
    ModelNotFound { path: PathBuf },

    #[error("Corrupt or incompatible model at {}: {reason}", path.display())]
    CorruptModel { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FraudError {
    pub fn config(reason: impl Into<String>) -> Self {
        FraudError::Config {
            reason: reason.into(),
        }
    }

    pub fn numerical(reason: impl Into<String>) -> Self {
        FraudError::Numerical {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FraudError::InputNotFound { .. }
            | FraudError::MissingLabelColumn { .. }
            | FraudError::InvalidValue { .. }
            | FraudError::InvalidField { .. }
            | FraudError::InvalidLabel { .. }
            | FraudError::EmptyDataset
            | FraudError::FeatureWidth { .. }
            | FraudError::Input { .. }
            | FraudError::Csv(_) => ErrorKind::Input,
            FraudError::Config { .. } | FraudError::ClassAbsent { .. } => ErrorKind::Configuration,
            FraudError::Numerical { .. } | FraudError::NotConverged { .. } => ErrorKind::Numerical,
            FraudError::ModelNotFound { .. }
            | FraudError::CorruptModel { .. }
            | FraudError::Io(_)
            | FraudError::Json(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_message() {
        let err = FraudError::ModelNotFound {
            path: PathBuf::from("models/missing.json"),
        };
        assert_eq!(err.to_string(), "Model not found: models/missing.json");
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn test_class_absent_is_configuration() {
        let err = FraudError::ClassAbsent {
            label: "Fraud".to_string(),
            split: "train".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "Class Fraud is absent from the train split");
    }

    #[test]
    fn test_invalid_field_message() {
        let err = FraudError::InvalidField {
            field: "Amount".to_string(),
            value: "12abc".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid value '12abc' for Amount");
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_not_converged_is_numerical() {
        let err = FraudError::NotConverged { iterations: 100 };
        assert_eq!(err.kind(), ErrorKind::Numerical);
    }
}
