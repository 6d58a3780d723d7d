// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for the binary fraud classifier
//!
//! Implements:
//! - Confusion Matrix (rows = actual, columns = predicted)
//! - Per-class Precision, Recall, F1-Score and support
//! - Accuracy, Balanced Accuracy, Matthews Correlation Coefficient
//! - AUC-ROC, Average Precision and Brier score for probabilistic predictions
//!
//! Every ratio with a zero denominator is reported as 0.0.

use crate::datasets::Label;
use crate::error::{FraudError, Result};
use crate::model::Classifier;
use crate::sampling::HoldoutSet;
use serde::{Deserialize, Serialize};

/// Confusion matrix with fraud as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Fraud predicted as fraud
    pub tp: usize,
    /// Legitimate predicted as legitimate
    pub tn: usize,
    /// Legitimate predicted as fraud
    pub fp: usize,
    /// Fraud predicted as legitimate
    pub fn_: usize,
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        return 0.0;
    }
    num as f64 / denom as f64
}

fn harmonic_mean(precision: f64, recall: f64) -> f64 {
    let denom = precision + recall;
    if denom == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / denom
}

impl ConfusionMatrix {
    /// Tally predictions against ground truth
    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Result<Self> {
        if predictions.len() != ground_truth.len() {
            return Err(FraudError::Input {
                reason: format!(
                    "{} predictions for {} ground-truth labels",
                    predictions.len(),
                    ground_truth.len()
                ),
            });
        }

        let mut matrix = Self::default();
        for (pred, truth) in predictions.iter().zip(ground_truth) {
            match (pred, truth) {
                (Label::Fraud, Label::Fraud) => matrix.tp += 1,
                (Label::Legitimate, Label::Legitimate) => matrix.tn += 1,
                (Label::Fraud, Label::Legitimate) => matrix.fp += 1,
                (Label::Legitimate, Label::Fraud) => matrix.fn_ += 1,
            }
        }
        Ok(matrix)
    }

    /// Cells indexed `[actual][predicted]` in `[Legitimate, Fraud]` order
    pub fn cells(&self) -> [[usize; 2]; 2] {
        [[self.tn, self.fp], [self.fn_, self.tp]]
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision, recall, F1 and support with `label` as the positive class
    pub fn class_metrics(&self, label: Label) -> ClassMetrics {
        let (tp, fp, fn_) = match label {
            Label::Fraud => (self.tp, self.fp, self.fn_),
            Label::Legitimate => (self.tn, self.fn_, self.fp),
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        ClassMetrics {
            precision,
            recall,
            f1_score: harmonic_mean(precision, recall),
            support: tp + fn_,
        }
    }

    /// Matthews Correlation Coefficient, in [-1, 1]
    pub fn mcc(&self) -> f64 {
        let tp = self.tp as f64;
        let tn = self.tn as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let numerator = tp * tn - fp * fn_;
        let denominator = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();

        if denominator == 0.0 {
            return 0.0;
        }
        numerator / denominator
    }

    /// Mean of the per-class recalls
    pub fn balanced_accuracy(&self) -> f64 {
        (self.class_metrics(Label::Fraud).recall + self.class_metrics(Label::Legitimate).recall) / 2.0
    }
}

/// Precision/recall/F1/support for one label (or an average over labels)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Structured evaluation of a classifier on a holdout set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub confusion_matrix: ConfusionMatrix,
    pub legitimate: ClassMetrics,
    pub fraud: ClassMetrics,
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub mcc: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// AUC-ROC (if probabilities available)
    pub auc_roc: Option<f64>,
    /// Area under the precision-recall curve
    pub average_precision: Option<f64>,
    /// Mean squared error of P(fraud), lower is better
    pub brier_score: Option<f64>,
}

impl EvaluationReport {
    pub fn from_confusion_matrix(cm: ConfusionMatrix) -> Self {
        let legitimate = cm.class_metrics(Label::Legitimate);
        let fraud = cm.class_metrics(Label::Fraud);
        let total = cm.total();

        let macro_avg = ClassMetrics {
            precision: (legitimate.precision + fraud.precision) / 2.0,
            recall: (legitimate.recall + fraud.recall) / 2.0,
            f1_score: (legitimate.f1_score + fraud.f1_score) / 2.0,
            support: total,
        };

        let weight = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total == 0 {
                return 0.0;
            }
            (f(&legitimate) * legitimate.support as f64 + f(&fraud) * fraud.support as f64) / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|m| m.precision),
            recall: weight(|m| m.recall),
            f1_score: weight(|m| m.f1_score),
            support: total,
        };

        Self {
            accuracy: cm.accuracy(),
            balanced_accuracy: cm.balanced_accuracy(),
            mcc: cm.mcc(),
            confusion_matrix: cm,
            legitimate,
            fraud,
            macro_avg,
            weighted_avg,
            auc_roc: None,
            average_precision: None,
            brier_score: None,
        }
    }

    pub fn from_predictions(predictions: &[Label], ground_truth: &[Label]) -> Result<Self> {
        let cm = ConfusionMatrix::from_predictions(predictions, ground_truth)?;
        Ok(Self::from_confusion_matrix(cm))
    }

    /// Report including probabilistic metrics; `probabilities` are P(fraud)
    pub fn from_predictions_with_probs(
        predictions: &[Label],
        ground_truth: &[Label],
        probabilities: &[f64],
    ) -> Result<Self> {
        if probabilities.len() != ground_truth.len() {
            return Err(FraudError::Input {
                reason: format!(
                    "{} probabilities for {} ground-truth labels",
                    probabilities.len(),
                    ground_truth.len()
                ),
            });
        }

        let mut report = Self::from_predictions(predictions, ground_truth)?;
        report.auc_roc = Some(auc_roc(ground_truth, probabilities));
        report.average_precision = Some(average_precision(ground_truth, probabilities));
        report.brier_score = Some(brier_score(ground_truth, probabilities));
        Ok(report)
    }

    pub fn class(&self, label: Label) -> &ClassMetrics {
        match label {
            Label::Legitimate => &self.legitimate,
            Label::Fraud => &self.fraud,
        }
    }

    pub fn support(&self) -> usize {
        self.confusion_matrix.total()
    }

    /// Text table in the layout of a classification report
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:>14} {:>10} {:>10} {:>10} {:>10}\n\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        for label in Label::ALL {
            let m = self.class(label);
            out.push_str(&format!(
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                label.to_string(),
                m.precision,
                m.recall,
                m.f1_score,
                m.support
            ));
        }
        out.push('\n');
        out.push_str(&format!(
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.support()
        ));
        for (name, m) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            out.push_str(&format!(
                "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                name, m.precision, m.recall, m.f1_score, m.support
            ));
        }

        let cells = self.confusion_matrix.cells();
        out.push_str("\nConfusion Matrix:\n");
        out.push_str(&format!("{:>22} {:>12}\n", "Predicted", ""));
        out.push_str(&format!("{:>22} {:>12}\n", "Legitimate", "Fraud"));
        out.push_str(&format!("Actual Legitimate {:>10} {:>12}\n", cells[0][0], cells[0][1]));
        out.push_str(&format!("       Fraud      {:>10} {:>12}\n", cells[1][0], cells[1][1]));

        out.push_str(&format!("\nBalanced Accuracy: {:.4}\n", self.balanced_accuracy));
        out.push_str(&format!("MCC:               {:.4}\n", self.mcc));
        if let Some(auc) = self.auc_roc {
            out.push_str(&format!("AUC-ROC:           {:.4}\n", auc));
        }
        if let Some(ap) = self.average_precision {
            out.push_str(&format!("Average Precision: {:.4}\n", ap));
        }
        if let Some(brier) = self.brier_score {
            out.push_str(&format!("Brier Score:       {:.4}\n", brier));
        }
        out
    }
}

/// Score every holdout row with `model` and build the report
pub fn evaluate(model: &dyn Classifier, holdout: &HoldoutSet) -> Result<EvaluationReport> {
    let predictions = model.predict_batch(holdout.dataset())?;

    let predicted: Vec<Label> = predictions.iter().map(|p| p.label).collect();
    let probabilities: Vec<f64> = predictions.iter().map(|p| p.probability).collect();
    let actual = holdout.labels();

    let report = EvaluationReport::from_predictions_with_probs(&predicted, &actual, &probabilities)?;

    tracing::info!(
        "Evaluated {} on {} holdout rows: fraud precision={:.4}, recall={:.4}, F1={:.4}",
        model.name(),
        holdout.len(),
        report.fraud.precision,
        report.fraud.recall,
        report.fraud.f1_score
    );

    Ok(report)
}

/// Ground truth paired with scores, highest score first
fn ranked(ground_truth: &[Label], probabilities: &[f64]) -> Vec<(Label, f64)> {
    let mut pairs: Vec<(Label, f64)> = ground_truth.iter().copied().zip(probabilities.iter().copied()).collect();
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    pairs
}

/// AUC-ROC by the trapezoidal rule; tied scores form a single step
fn auc_roc(ground_truth: &[Label], probabilities: &[f64]) -> f64 {
    let pairs = ranked(ground_truth, probabilities);

    let n_pos = pairs.iter().filter(|(l, _)| *l == Label::Fraud).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;

    if n_pos == 0.0 || n_neg == 0.0 {
        return 0.5;
    }

    let mut auc = 0.0;
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut tpr_prev = 0.0;
    let mut fpr_prev = 0.0;
    let mut i = 0;

    while i < pairs.len() {
        let score = pairs[i].1;
        while i < pairs.len() && pairs[i].1 == score {
            if pairs[i].0 == Label::Fraud {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let tpr = tp / n_pos;
        let fpr = fp / n_neg;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;
        tpr_prev = tpr;
        fpr_prev = fpr;
    }

    auc
}

fn brier_score(ground_truth: &[Label], probabilities: &[f64]) -> f64 {
    if ground_truth.is_empty() {
        return 0.0;
    }
    let sum: f64 = ground_truth
        .iter()
        .zip(probabilities)
        .map(|(label, p)| (p - label.to_binary() as f64).powi(2))
        .sum();
    sum / ground_truth.len() as f64
}

/// Step-wise area under the precision-recall curve
fn average_precision(ground_truth: &[Label], probabilities: &[f64]) -> f64 {
    let pairs = ranked(ground_truth, probabilities);
    let n_pos = pairs.iter().filter(|(l, _)| *l == Label::Fraud).count() as f64;

    if n_pos == 0.0 {
        return 0.0;
    }

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut ap = 0.0;
    let mut prev_recall = 0.0;

    for (label, _) in &pairs {
        if *label == Label::Fraud {
            tp += 1.0;
        } else {
            fp += 1.0;
        }

        if *label == Label::Fraud {
            let precision = tp / (tp + fp);
            let recall = tp / n_pos;
            ap += precision * (recall - prev_recall);
            prev_recall = recall;
        }
    }

    ap
}
