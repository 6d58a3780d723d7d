// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training and evaluation pipeline for credit card fraud detection
//!
//! This crate provides:
//! - Transaction table loading (CSV) and synthetic generation
//! - Stratified train/test split and downsampling of the training part
//! - L2-regularized logistic regression with feature standardization
//! - Evaluation on the untouched holdout (confusion matrix, per-class metrics, AUC-ROC)
//! - Reference baselines (Random, Majority, Stratified)
//! - Checksummed model persistence
//! - Typed scoring of single transactions against a saved model
//! - Reproducible training pipeline with seeded randomness

pub mod baselines;
pub mod config;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod sampling;
pub mod serving;

pub use baselines::{all_baselines, MajorityBaseline, RandomBaseline, StratifiedBaseline};
pub use config::PipelineConfig;
pub use datasets::{CorrelationMatrix, Dataset, Label, LabelCounts, SyntheticConfig, Transaction};
pub use error::{ErrorKind, FraudError, Result};
pub use metrics::{evaluate, ClassMetrics, ConfusionMatrix, EvaluationReport};
pub use model::{Classifier, LogisticRegression, Prediction, SolverConfig};
pub use pipeline::{TrainingPipeline, TrainingResults};
pub use sampling::{downsample, split_and_balance, stratified_split, HoldoutSet, Split};
pub use serving::{FeatureField, FeatureSchema, Score, ScoringContext, Verdict};
