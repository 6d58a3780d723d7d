// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible training pipeline for fraud detection
//!
//! Orchestrates:
//! - Dataset loading (CSV or synthetic)
//! - Stratified split and downsampling of the training part
//! - Logistic regression training
//! - Evaluation on the untouched holdout, next to reference baselines
//! - Model and processed-data persistence
//! - Results serialization
//!
//! Nothing is written to disk until training and evaluation have succeeded.

use crate::baselines::all_baselines;
use crate::config::PipelineConfig;
use crate::datasets::{CorrelationMatrix, Dataset, LabelCounts};
use crate::error::Result;
use crate::metrics::{evaluate, EvaluationReport};
use crate::model::{Classifier, LogisticRegression};
use crate::persistence;
use crate::sampling::split_and_balance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Results from evaluating one classifier on the holdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResult {
    pub model_name: String,
    pub model_description: String,
    pub report: EvaluationReport,
    pub training_samples: usize,
    pub eval_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub n_features: usize,
    pub test_fraction: f64,
    pub source: LabelCounts,
    pub train: LabelCounts,
    pub balanced: LabelCounts,
    pub test: LabelCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub model: String,
    pub accuracy: f64,
    pub fraud_f1: f64,
    pub fraud_recall: f64,
    pub mcc: f64,
    pub auc_roc: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Classifier with the highest fraud F1
    pub best_model: String,
    pub best_fraud_f1: f64,
    /// Whether the fitted model beats every baseline on fraud F1
    pub beats_baselines: bool,
    pub comparison: Vec<BaselineComparison>,
}

/// Complete training results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingResults {
    pub config: PipelineConfig,
    pub dataset_info: DatasetInfo,
    pub model: ModelResult,
    pub baseline_results: Vec<ModelResult>,
    pub summary: TrainingSummary,
    /// Standardized weights, largest magnitude first
    pub feature_weights: Vec<(String, f64)>,
    /// Feature and label correlations on the balanced training set
    pub correlations: CorrelationMatrix,
    pub solver_iterations: usize,
    pub model_path: PathBuf,
    pub processed_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Main training pipeline
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the source table named by the configuration
    pub fn load_dataset(&self) -> Result<Dataset> {
        let dataset = match &self.config.synthetic {
            Some(synthetic) => {
                tracing::info!("Generating synthetic dataset with seed {}", self.config.seed);
                Dataset::synthetic(synthetic, self.config.seed)?
            }
            None => {
                tracing::info!("Loading dataset from {}", self.config.data_path.display());
                Dataset::load_csv(&self.config.data_path, &self.config.label_column)?
            }
        };

        let counts = dataset.label_counts();
        tracing::info!(
            "Dataset loaded: {} rows, {} features (legitimate={}, fraud={})",
            dataset.len(),
            dataset.n_features(),
            counts.legitimate,
            counts.fraud
        );

        Ok(dataset)
    }

    fn model_result(model: &dyn Classifier, report: EvaluationReport, training_samples: usize) -> ModelResult {
        ModelResult {
            model_name: model.name().to_string(),
            model_description: model.description().to_string(),
            eval_samples: report.support(),
            report,
            training_samples,
        }
    }

    /// Run the full training pipeline
    pub fn run(&self) -> Result<TrainingResults> {
        self.config.validate()?;

        let dataset = self.load_dataset()?;
        let name = dataset.name.clone();
        let n_features = dataset.n_features();
        let source = dataset.label_counts();

        let (balanced, holdout) = split_and_balance(dataset, self.config.test_fraction, self.config.seed)?;
        let test = holdout.label_counts();
        // The split partitions the source, so the training counts are what the holdout left
        let train = LabelCounts {
            legitimate: source.legitimate - test.legitimate,
            fraud: source.fraud - test.fraud,
        };

        if test.fraud < 2 {
            tracing::warn!(
                "Holdout has {} fraud rows; fraud metrics will be unreliable",
                test.fraud
            );
        }

        let dataset_info = DatasetInfo {
            name,
            n_features,
            test_fraction: self.config.test_fraction,
            source,
            train,
            balanced: balanced.label_counts(),
            test,
        };

        let correlations = balanced.correlation_matrix();

        tracing::info!("Training logistic regression on {} balanced rows", balanced.len());
        let model = LogisticRegression::fit(&balanced, &self.config.solver)?;
        let report = evaluate(&model, &holdout)?;
        tracing::info!(
            "  {} - Accuracy: {:.4}, Fraud F1: {:.4}, MCC: {:.4}",
            model.name(),
            report.accuracy,
            report.fraud.f1_score,
            report.mcc
        );
        let model_result = Self::model_result(&model, report, balanced.len());

        let mut baseline_results = Vec::new();
        if self.config.run_baselines {
            for baseline in all_baselines(&balanced, self.config.seed) {
                tracing::info!("Evaluating baseline: {}", baseline.name());
                let report = evaluate(baseline.as_ref(), &holdout)?;
                baseline_results.push(Self::model_result(baseline.as_ref(), report, balanced.len()));
            }
        }

        let summary = summarize(&model_result, &baseline_results);

        if let Some(path) = &self.config.processed_path {
            balanced.save_csv(path)?;
            tracing::info!("Balanced training set saved to {}", path.display());
        }
        if let Err(err) = persistence::save(&model, &self.config.model_path) {
            // A run without a model leaves no processed data behind either
            if let Some(path) = &self.config.processed_path {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    tracing::warn!("Could not remove {}: {}", path.display(), cleanup);
                }
            }
            return Err(err);
        }

        Ok(TrainingResults {
            config: self.config.clone(),
            dataset_info,
            feature_weights: model.feature_weights(),
            correlations,
            solver_iterations: model.iterations,
            model: model_result,
            baseline_results,
            summary,
            model_path: self.config.model_path.clone(),
            processed_path: self.config.processed_path.clone(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Save results to JSON file
    pub fn save_results(results: &TrainingResults, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(results: &TrainingResults) -> String {
        let mut report = String::new();
        let info = &results.dataset_info;

        report.push_str("# Fraud Detection Training Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));

        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **Source:** {}\n", info.name));
        report.push_str(&format!("- **Features:** {}\n", info.n_features));
        report.push_str(&format!("- **Test Fraction:** {}\n\n", info.test_fraction));
        report.push_str("| Split | Legitimate | Fraud | Fraud Rate |\n");
        report.push_str("|-------|------------|-------|------------|\n");
        for (split, counts) in [
            ("Source", &info.source),
            ("Train", &info.train),
            ("Balanced", &info.balanced),
            ("Test", &info.test),
        ] {
            report.push_str(&format!(
                "| {} | {} | {} | {:.4} |\n",
                split,
                counts.legitimate,
                counts.fraud,
                counts.fraud_rate()
            ));
        }

        report.push_str("\n## Summary\n\n");
        report.push_str(&format!(
            "**Best Model:** {} (Fraud F1={:.4})\n\n",
            results.summary.best_model, results.summary.best_fraud_f1
        ));
        if !results.baseline_results.is_empty() && !results.summary.beats_baselines {
            report.push_str("> The fitted model does not beat every baseline on fraud F1.\n\n");
        }

        report.push_str("### Comparison\n\n");
        report.push_str("| Model | Accuracy | Fraud F1 | Fraud Recall | MCC | AUC-ROC |\n");
        report.push_str("|-------|----------|----------|--------------|-----|---------|\n");
        for row in &results.summary.comparison {
            let auc = row.auc_roc.map_or("-".to_string(), |v| format!("{:.4}", v));
            report.push_str(&format!(
                "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {} |\n",
                row.model, row.accuracy, row.fraud_f1, row.fraud_recall, row.mcc, auc
            ));
        }

        report.push_str("\n## Model\n\n");
        report.push_str(&format!("*{}*\n\n", results.model.model_description));
        report.push_str(&format!("- Training samples: {}\n", results.model.training_samples));
        report.push_str(&format!("- Evaluation samples: {}\n", results.model.eval_samples));
        report.push_str(&format!("- Solver iterations: {}\n", results.solver_iterations));
        report.push_str(&format!("- Saved to: `{}`\n\n", results.model_path.display()));

        report.push_str("#### Performance Metrics\n\n");
        report.push_str(&format!("```\n{}\n```\n\n", results.model.report.format()));

        report.push_str("#### Feature Weights\n\n");
        report.push_str("| Feature | Weight |\n");
        report.push_str("|---------|--------|\n");
        for (feature, weight) in results.feature_weights.iter().take(10) {
            report.push_str(&format!("| {} | {:+.4} |\n", feature, weight));
        }

        report.push_str("\n## Feature Correlations (balanced training set)\n\n");
        report.push_str(&results.correlations.to_markdown());

        if !results.baseline_results.is_empty() {
            report.push_str("\n## Baselines\n\n");
            for result in &results.baseline_results {
                report.push_str(&format!("### {}\n\n", result.model_name));
                report.push_str(&format!("*{}*\n\n", result.model_description));
                report.push_str(&format!("```\n{}\n```\n\n", result.report.format()));
            }
        }

        report.push_str("## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&results.config).unwrap_or_default()
        ));

        report
    }
}

fn summarize(model: &ModelResult, baselines: &[ModelResult]) -> TrainingSummary {
    let comparison: Vec<BaselineComparison> = std::iter::once(model)
        .chain(baselines)
        .map(|r| BaselineComparison {
            model: r.model_name.clone(),
            accuracy: r.report.accuracy,
            fraud_f1: r.report.fraud.f1_score,
            fraud_recall: r.report.fraud.recall,
            mcc: r.report.mcc,
            auc_roc: r.report.auc_roc,
        })
        .collect();

    // Ties go to the earlier entry, so the fitted model wins them
    let best = comparison
        .iter()
        .fold(&comparison[0], |best, row| if row.fraud_f1 > best.fraud_f1 { row } else { best });

    TrainingSummary {
        best_model: best.model.clone(),
        best_fraud_f1: best.fraud_f1,
        beats_baselines: baselines
            .iter()
            .all(|b| model.report.fraud.f1_score > b.report.fraud.f1_score),
        comparison,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::SyntheticConfig;
    use crate::error::FraudError;

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            synthetic: Some(SyntheticConfig {
                rows: 1000,
                fraud_rate: 0.1,
                n_features: 4,
                separation: 2.5,
            }),
            model_path: dir.join("models").join("model.json"),
            output_dir: dir.join("artifacts"),
            processed_path: Some(dir.join("processed").join("balanced.csv")),
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let results = TrainingPipeline::new(config(dir.path())).run().expect("Pipeline should succeed");

        let info = &results.dataset_info;
        assert_eq!(info.source.total(), 1000);
        assert_eq!(info.test.total(), 200);
        assert_eq!(info.train.total(), 800);
        assert_eq!(info.balanced.legitimate, info.balanced.fraud);
        assert_eq!(info.balanced.fraud, info.train.fraud);

        // Evaluated on the imbalanced holdout, never the balanced set
        assert_eq!(results.model.eval_samples, 200);
        assert_eq!(results.model.report.fraud.support, info.test.fraud);

        assert_eq!(results.baseline_results.len(), 3);
        assert_eq!(results.summary.comparison.len(), 4);
        assert!(results.model.report.fraud.f1_score > 0.5);
        assert!(results.summary.beats_baselines);
    }

    #[test]
    fn test_pipeline_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let results = TrainingPipeline::new(config.clone()).run().unwrap();

        let model = persistence::load(&config.model_path).unwrap();
        assert_eq!(model.n_features(), 4);
        assert_eq!(model.feature_weights(), results.feature_weights);

        let processed = Dataset::load_csv(config.processed_path.as_ref().unwrap(), "Class").unwrap();
        assert_eq!(processed.label_counts(), results.dataset_info.balanced);
    }

    #[test]
    fn test_pipeline_is_reproducible() {
        let a_dir = tempfile::tempdir().unwrap();
        let b_dir = tempfile::tempdir().unwrap();
        let a = TrainingPipeline::new(config(a_dir.path())).run().unwrap();
        let b = TrainingPipeline::new(config(b_dir.path())).run().unwrap();

        assert_eq!(a.model.report, b.model.report);
        assert_eq!(a.feature_weights, b.feature_weights);
    }

    #[test]
    fn test_pipeline_without_baselines() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            run_baselines: false,
            processed_path: None,
            ..config(dir.path())
        };
        let results = TrainingPipeline::new(config).run().unwrap();

        assert!(results.baseline_results.is_empty());
        assert_eq!(results.summary.best_model, "LogisticRegression");
        assert!(!dir.path().join("processed").exists());
    }

    #[test]
    fn test_failed_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            synthetic: None,
            data_path: dir.path().join("missing.csv"),
            ..config(dir.path())
        };

        let err = TrainingPipeline::new(config.clone()).run().unwrap_err();
        assert!(matches!(err, FraudError::InputNotFound { .. }));
        assert!(!config.model_path.exists());
        assert!(!dir.path().join("processed").exists());
    }

    #[test]
    fn test_single_class_table_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            synthetic: Some(SyntheticConfig {
                rows: 200,
                fraud_rate: 0.0,
                n_features: 3,
                separation: 1.0,
            }),
            ..config(dir.path())
        };

        let err = TrainingPipeline::new(config.clone()).run().unwrap_err();
        assert!(matches!(err, FraudError::ClassAbsent { ref label, .. } if label == "Fraud"));
        assert!(!config.model_path.exists());
        assert!(!config.processed_path.unwrap().exists());
    }

    #[test]
    fn test_failed_model_save_removes_processed_data() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the model directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let config = PipelineConfig {
            model_path: blocker.join("model.json"),
            ..config(dir.path())
        };

        assert!(TrainingPipeline::new(config.clone()).run().is_err());
        assert!(!config.processed_path.unwrap().exists());
    }

    #[test]
    fn test_results_carry_correlations() {
        let dir = tempfile::tempdir().unwrap();
        let results = TrainingPipeline::new(config(dir.path())).run().unwrap();

        let corr = &results.correlations;
        assert_eq!(corr.columns, vec!["V1", "V2", "V3", "V4", "Class"]);
        // Fraud rows are shifted up on V1 and down on V2
        assert!(corr.get("V1", "Class").unwrap() > 0.3);
        assert!(corr.get("V2", "Class").unwrap() < -0.3);
        assert!((corr.get("V3", "V3").unwrap() - 1.0).abs() < 1e-9);

        let report = TrainingPipeline::generate_report(&results);
        assert!(report.contains("Feature Correlations"));
        assert!(report.contains("| **Class** |"));
    }

    #[test]
    fn test_generate_report_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let results = TrainingPipeline::new(config.clone()).run().unwrap();

        let report = TrainingPipeline::generate_report(&results);
        assert!(report.contains("Fraud Detection Training Report"));
        assert!(report.contains("| Balanced |"));
        assert!(report.contains("Feature Weights"));
        assert!(report.contains("Confusion Matrix"));

        let json_path = config.output_dir.join("evaluation.json");
        TrainingPipeline::save_results(&results, &json_path).unwrap();
        let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
        assert_eq!(saved["dataset_info"]["test"]["fraud"], results.dataset_info.test.fraud);
    }
}
