// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Pipeline configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! seed = 7
//! test_fraction = 0.25
//!
//! [solver]
//! c = 0.5
//! ```

use crate::datasets::{SyntheticConfig, DEFAULT_LABEL_COLUMN};
use crate::error::{FraudError, Result};
use crate::model::SolverConfig;
use crate::sampling::validate_test_fraction;
use ::config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Random seed for the split and the downsampling draw
    pub seed: u64,
    /// Labeled transaction table
    pub data_path: PathBuf,
    /// Generate data instead of reading `data_path`
    pub synthetic: Option<SyntheticConfig>,
    pub label_column: String,
    /// Share of rows held out for evaluation
    pub test_fraction: f64,
    pub solver: SolverConfig,
    /// Where the fitted model is written
    pub model_path: PathBuf,
    /// Directory for evaluation reports
    pub output_dir: PathBuf,
    /// Where the balanced training set is written, if anywhere
    pub processed_path: Option<PathBuf>,
    /// Evaluate reference baselines next to the model
    pub run_baselines: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            data_path: PathBuf::from("data/raw_data/creditcard.csv"),
            synthetic: None,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
            test_fraction: 0.2,
            solver: SolverConfig::default(),
            model_path: PathBuf::from("models/logistic_regression_model.json"),
            output_dir: PathBuf::from("artifacts"),
            processed_path: Some(PathBuf::from("data/processed/processed_data.csv")),
            run_baselines: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FraudError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let settings = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|e| FraudError::config(format!("failed to read {}: {}", path.display(), e)))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| FraudError::config(format!("failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail only after work has started
    pub fn validate(&self) -> Result<()> {
        validate_test_fraction(self.test_fraction)?;
        self.solver.validate()?;
        if self.label_column.trim().is_empty() {
            return Err(FraudError::config("label column name is empty"));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(FraudError::config("model path is empty"));
        }
        Ok(())
    }
}
