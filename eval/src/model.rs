// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary classifiers and the logistic regression trainer
//!
//! `LogisticRegression::fit` standardizes features on the training set and
//! minimizes the L2-penalized log loss with Newton-Raphson steps:
//!
//! ```text
//! C * sum_i logloss(y_i, sigmoid(b + w.x_i)) + 0.5 * |w|^2
//! ```
//!
//! The intercept is not penalized.

use crate::datasets::{Dataset, Label};
use crate::error::{FraudError, Result};
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Prediction output from a classifier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    /// P(fraud)
    pub probability: f64,
}

/// Anything that can label a transaction feature vector
pub trait Classifier: Send + Sync {
    /// Predict a single feature vector
    fn predict(&self, features: &[f64]) -> Result<Prediction>;

    /// Predict every row of a dataset
    fn predict_batch(&self, dataset: &Dataset) -> Result<Vec<Prediction>> {
        dataset.records.iter().map(|r| self.predict(&r.features)).collect()
    }

    fn name(&self) -> &str;

    fn description(&self) -> &str;
}

pub(crate) fn check_width(expected: usize, features: &[f64]) -> Result<()> {
    if features.len() != expected {
        return Err(FraudError::FeatureWidth {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

/// Solver settings for logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Convergence threshold on the largest parameter update
    pub tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.c.is_finite() || self.c <= 0.0 {
            return Err(FraudError::config(format!("C must be positive, got {}", self.c)));
        }
        if self.max_iter == 0 {
            return Err(FraudError::config("max_iter must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(FraudError::config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Per-feature centering and scaling learned from training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Standardizer {
    pub fn fit(dataset: &Dataset) -> Result<Self> {
        let n = dataset.len() as f64;
        let d = dataset.n_features();

        let mut mean = vec![0.0; d];
        for record in &dataset.records {
            for (m, x) in mean.iter_mut().zip(&record.features) {
                *m += x;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; d];
        for record in &dataset.records {
            for ((v, x), m) in var.iter_mut().zip(&record.features).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }

        let mut scale = Vec::with_capacity(d);
        for (j, v) in var.iter().enumerate() {
            let std = (v / n).sqrt();
            if !std.is_finite() || std <= 1e-12 * mean[j].abs().max(1.0) {
                return Err(FraudError::numerical(format!(
                    "feature '{}' has zero variance in the training data",
                    dataset.feature_names[j]
                )));
            }
            scale.push(std);
        }

        Ok(Self { mean, scale })
    }

    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// log(1 + exp(z)) without overflow
fn log1p_exp(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| {
                a[[i, col]]
                    .abs()
                    .partial_cmp(&a[[j, col]].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);

        if !a[[pivot, col]].is_finite() || a[[pivot, col]].abs() < 1e-12 {
            return Err(FraudError::numerical("singular Hessian"));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        let pivot_row = a.row(col).to_owned();
        for row in col + 1..n {
            let factor = a[[row, col]] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            a.row_mut(row).scaled_add(-factor, &pivot_row);
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail = a.slice(s![row, row + 1..]).dot(&x.slice(s![row + 1..]));
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

/// Fitted L2-regularized logistic regression over standardized features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub feature_names: Vec<String>,
    pub scaler: Standardizer,
    /// Weights in standardized feature space
    pub weights: Vec<f64>,
    pub intercept: f64,
    /// Probability above which a transaction is labeled fraud
    pub threshold: f64,
    pub solver: SolverConfig,
    /// Newton iterations used by the fit
    pub iterations: usize,
}

impl LogisticRegression {
    pub fn fit(train: &Dataset, solver: &SolverConfig) -> Result<Self> {
        solver.validate()?;

        let counts = train.label_counts();
        for label in Label::ALL {
            if counts.get(label) == 0 {
                return Err(FraudError::ClassAbsent {
                    label: label.to_string(),
                    split: "training".to_string(),
                });
            }
        }

        let scaler = Standardizer::fit(train)?;
        let d = train.n_features();

        // Design matrix with a leading column of ones for the intercept
        let mut x = Array2::<f64>::ones((train.len(), d + 1));
        for (mut row, record) in x.outer_iter_mut().zip(&train.records) {
            row.slice_mut(s![1..]).assign(&Array1::from(scaler.transform(&record.features)));
        }
        let y: Array1<f64> = train.records.iter().map(|r| r.label.to_binary() as f64).collect();

        // Penalty per parameter; the intercept is free
        let mut ridge = Array1::from_elem(d + 1, 1.0 / solver.c);
        ridge[0] = 0.0;

        let objective = |theta: &Array1<f64>| -> f64 {
            let loss: f64 = x
                .dot(theta)
                .iter()
                .zip(&y)
                .map(|(z, yi)| log1p_exp(*z) - yi * z)
                .sum();
            loss + (&ridge * theta * theta).sum() / 2.0
        };

        let mut theta = Array1::<f64>::zeros(d + 1);
        let mut current = objective(&theta);

        for iteration in 1..=solver.max_iter {
            let p = x.dot(&theta).mapv(sigmoid);
            let w = p.mapv(|p| p * (1.0 - p));

            let gradient = x.t().dot(&(&p - &y)) + &ridge * &theta;
            let weighted = &x * &w.view().insert_axis(Axis(1));
            let mut hessian = x.t().dot(&weighted);
            let mut diagonal = hessian.diag_mut();
            diagonal += &ridge;

            let step = solve(hessian, gradient)?;

            // Halve the Newton step until the objective stops increasing
            let mut t = 1.0;
            let mut candidate: Array1<f64>;
            let mut value;
            loop {
                candidate = &theta - &(&step * t);
                value = objective(&candidate);
                if value <= current + 1e-12 * current.abs() || t < 1e-10 {
                    break;
                }
                t /= 2.0;
            }

            if !value.is_finite() || candidate.iter().any(|v| !v.is_finite()) {
                return Err(FraudError::numerical(format!(
                    "non-finite parameters at iteration {}",
                    iteration
                )));
            }

            let max_update = step.iter().map(|s| (t * s).abs()).fold(0.0, f64::max);
            theta = candidate;
            current = value;

            tracing::debug!("Newton step {}: objective={:.6}, max_update={:.3e}", iteration, current, max_update);

            if max_update < solver.tolerance {
                tracing::info!(
                    "Logistic regression converged after {} iterations ({} rows, {} features)",
                    iteration,
                    train.len(),
                    d
                );
                return Ok(Self {
                    feature_names: train.feature_names.clone(),
                    scaler,
                    weights: theta.slice(s![1..]).to_vec(),
                    intercept: theta[0],
                    threshold: 0.5,
                    solver: solver.clone(),
                    iterations: iteration,
                });
            }
        }

        Err(FraudError::NotConverged {
            iterations: solver.max_iter,
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Linear score b + w.x on standardized features
    pub fn decision_function(&self, features: &[f64]) -> Result<f64> {
        check_width(self.n_features(), features)?;
        let standardized = self.scaler.transform(features);
        Ok(ArrayView1::from(&standardized).dot(&ArrayView1::from(&self.weights)) + self.intercept)
    }

    /// P(fraud) for one feature vector
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        Ok(sigmoid(self.decision_function(features)?))
    }

    /// Features ordered by absolute standardized weight
    pub fn feature_weights(&self) -> Vec<(String, f64)> {
        let mut weights: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.weights.iter().copied())
            .collect();
        weights.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
        weights
    }

    /// Check internal consistency of a deserialized model
    pub fn validate(&self) -> std::result::Result<(), String> {
        let d = self.feature_names.len();
        if d == 0 {
            return Err("model has no features".to_string());
        }
        if self.weights.len() != d || self.scaler.mean.len() != d || self.scaler.scale.len() != d {
            return Err(format!(
                "parameter widths disagree (features={}, weights={}, mean={}, scale={})",
                d,
                self.weights.len(),
                self.scaler.mean.len(),
                self.scaler.scale.len()
            ));
        }
        let finite = self
            .weights
            .iter()
            .chain(&self.scaler.mean)
            .chain(&self.scaler.scale)
            .chain(std::iter::once(&self.intercept))
            .all(|v| v.is_finite());
        if !finite {
            return Err("non-finite parameter".to_string());
        }
        if self.scaler.scale.iter().any(|s| *s <= 0.0) {
            return Err("non-positive feature scale".to_string());
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(format!("threshold {} outside (0, 1)", self.threshold));
        }
        Ok(())
    }
}

impl Classifier for LogisticRegression {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        let probability = self.predict_proba(features)?;
        Ok(Prediction {
            label: if probability > self.threshold {
                Label::Fraud
            } else {
                Label::Legitimate
            },
            probability,
        })
    }

    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn description(&self) -> &str {
        "L2-regularized logistic regression on standardized features"
    }
}
