// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training pipeline CLI for fraud detection
//!
//! Usage:
//!   fraud-train --data data/raw_data/creditcard.csv --seed 42
//!   fraud-train --config train.toml --no-baselines
//!   fraud-train --synthetic --output artifacts

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use fraud_eval::config::PipelineConfig;
use fraud_eval::datasets::SyntheticConfig;
use fraud_eval::pipeline::TrainingPipeline;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
    Both,
}

#[derive(Parser, Debug)]
#[command(name = "fraud-train")]
#[command(about = "Train and evaluate a fraud detection model")]
#[command(version)]
struct Args {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Labeled transaction CSV
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Generate a synthetic transaction table instead of reading one
    #[arg(long, conflicts_with = "data")]
    synthetic: bool,

    /// Name of the label column
    #[arg(long)]
    label_column: Option<String>,

    /// Share of rows held out for evaluation
    #[arg(short, long)]
    test_fraction: Option<f64>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Where to write the fitted model
    #[arg(short, long)]
    model_path: Option<PathBuf>,

    /// Output directory for evaluation reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where to write the balanced training set
    #[arg(long)]
    processed_path: Option<PathBuf>,

    /// Do not write the balanced training set
    #[arg(long, conflicts_with = "processed_path")]
    no_processed: bool,

    /// Skip the reference baselines
    #[arg(long)]
    no_baselines: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,
}

impl Args {
    fn into_config(self) -> Result<(PipelineConfig, OutputFormat)> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load_from_path(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(data) = self.data {
            config.data_path = data;
            config.synthetic = None;
        }
        if self.synthetic && config.synthetic.is_none() {
            config.synthetic = Some(SyntheticConfig::default());
        }
        if let Some(label_column) = self.label_column {
            config.label_column = label_column;
        }
        if let Some(test_fraction) = self.test_fraction {
            config.test_fraction = test_fraction;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(model_path) = self.model_path {
            config.model_path = model_path;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(processed_path) = self.processed_path {
            config.processed_path = Some(processed_path);
        }
        if self.no_processed {
            config.processed_path = None;
        }
        if self.no_baselines {
            config.run_baselines = false;
        }

        config.validate().context("invalid configuration")?;
        Ok((config, self.format))
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, format) = Args::parse().into_config()?;

    tracing::info!("Fraud Detection Training Pipeline");
    tracing::info!("=================================");
    match &config.synthetic {
        Some(synthetic) => tracing::info!("Data: synthetic ({} rows)", synthetic.rows),
        None => tracing::info!("Data: {}", config.data_path.display()),
    }
    tracing::info!("Seed: {}", config.seed);
    tracing::info!("Test fraction: {}", config.test_fraction);

    let output_dir = config.output_dir.clone();
    let results = TrainingPipeline::new(config)
        .run()
        .context("training pipeline failed")?;

    // Print summary to console
    let info = &results.dataset_info;
    println!("\n{}", "=".repeat(70));
    println!("TRAINING SUMMARY");
    println!("{}", "=".repeat(70));
    println!(
        "\nRows: source={} train={} balanced={} test={}",
        info.source.total(),
        info.train.total(),
        info.balanced.total(),
        info.test.total()
    );
    println!(
        "Fraud in test set: {} of {} ({:.2}%)",
        info.test.fraud,
        info.test.total(),
        info.test.fraud_rate() * 100.0
    );
    println!("\nClassification Report (holdout):");
    println!("{:-<70}", "");
    print!("{}", results.model.report.format());
    println!("{:-<70}", "");

    println!("\nComparison:");
    println!("{:-<70}", "");
    println!(
        "{:<20} {:>10} {:>10} {:>10} {:>8} {:>8}",
        "Model", "Accuracy", "Fraud F1", "Recall", "MCC", "AUC"
    );
    println!("{:-<70}", "");
    for row in &results.summary.comparison {
        let auc = row.auc_roc.map_or("-".to_string(), |v| format!("{:.4}", v));
        println!(
            "{:<20} {:>10.4} {:>10.4} {:>10.4} {:>8.4} {:>8}",
            row.model, row.accuracy, row.fraud_f1, row.fraud_recall, row.mcc, auc
        );
    }
    println!("{:-<70}", "");
    println!("\nBest Model: {} (Fraud F1={:.4})", results.summary.best_model, results.summary.best_fraud_f1);
    println!("Model saved to: {}", results.model_path.display());
    if let Some(path) = &results.processed_path {
        println!("Balanced training set saved to: {}", path.display());
    }

    // Save outputs
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    if matches!(format, OutputFormat::Json | OutputFormat::Both) {
        let json_path = output_dir.join("evaluation.json");
        TrainingPipeline::save_results(&results, &json_path)?;
        println!("\nJSON results saved to: {}", json_path.display());
    }

    if matches!(format, OutputFormat::Markdown | OutputFormat::Both) {
        let report = TrainingPipeline::generate_report(&results);
        let md_path = output_dir.join("evaluation.md");
        std::fs::write(&md_path, report)
            .with_context(|| format!("failed to write {}", md_path.display()))?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    println!("\nTraining complete!");

    Ok(())
}
