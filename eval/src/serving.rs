// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Scoring single transactions with a persisted model
//!
//! A [`ScoringContext`] owns the loaded model and the [`FeatureSchema`] that
//! turns raw text inputs into a feature vector. Inputs are parsed and
//! validated in full before the model is consulted.

use crate::error::{FraudError, Result};
use crate::model::{Classifier, LogisticRegression};
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// One model input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureField {
    /// Column name the model was trained on
    pub name: String,
    /// Human-facing label
    pub label: String,
    /// Value used when the input omits this field
    pub default: f64,
}

/// Ordered description of the values a model expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub fields: Vec<FeatureField>,
}

impl FeatureSchema {
    /// One field per model feature, labeled by name, defaulting to 0
    pub fn for_model(model: &LogisticRegression) -> Self {
        Self {
            fields: model
                .feature_names
                .iter()
                .map(|name| FeatureField {
                    name: name.clone(),
                    label: name.clone(),
                    default: 0.0,
                })
                .collect(),
        }
    }

    /// Replace display labels, keyed by field name
    pub fn with_labels(mut self, labels: &HashMap<String, String>) -> Self {
        for field in &mut self.fields {
            if let Some(label) = labels.get(&field.name) {
                field.label = label.clone();
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse text inputs keyed by field name into a feature vector
    ///
    /// Missing fields take their default. Unknown names and values that are
    /// not finite numbers are rejected.
    pub fn parse(&self, inputs: &HashMap<String, String>) -> Result<Vec<f64>> {
        if let Some(unknown) = inputs.keys().find(|k| !self.fields.iter().any(|f| &f.name == *k)) {
            return Err(FraudError::Input {
                reason: format!("unknown feature '{}'", unknown),
            });
        }

        self.fields
            .iter()
            .map(|field| match inputs.get(&field.name) {
                None => Ok(field.default),
                Some(raw) => raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| FraudError::InvalidField {
                        field: field.name.clone(),
                        value: raw.clone(),
                    }),
            })
            .collect()
    }
}

/// Human-facing outcome of scoring a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Fraud,
    NotFraud,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Fraud => write!(f, "Fraud"),
            Verdict::NotFraud => write!(f, "Not Fraud"),
        }
    }
}

/// Verdict with the model's fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub verdict: Verdict,
    pub probability: f64,
}

/// Loaded model plus the schema used to read its inputs
#[derive(Debug, Clone)]
pub struct ScoringContext {
    model: LogisticRegression,
    schema: FeatureSchema,
}

impl ScoringContext {
    pub fn new(model: LogisticRegression, schema: FeatureSchema) -> Result<Self> {
        if schema.len() != model.n_features() {
            return Err(FraudError::config(format!(
                "schema has {} fields, model expects {} features",
                schema.len(),
                model.n_features()
            )));
        }
        if let Some((field, expected)) = schema
            .fields
            .iter()
            .zip(&model.feature_names)
            .find(|(f, name)| &f.name != *name)
        {
            return Err(FraudError::config(format!(
                "schema field '{}' does not match model feature '{}'",
                field.name, expected
            )));
        }
        Ok(Self { model, schema })
    }

    /// Load a persisted model and derive its schema
    pub fn load(model_path: &Path) -> Result<Self> {
        let model = persistence::load(model_path)?;
        let schema = FeatureSchema::for_model(&model);
        Self::new(model, schema)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn model(&self) -> &LogisticRegression {
        &self.model
    }

    pub fn classify(&self, inputs: &HashMap<String, String>) -> Result<Score> {
        let features = self.schema.parse(inputs)?;
        let prediction = self.model.predict(&features)?;

        let verdict = match prediction.label {
            crate::datasets::Label::Fraud => Verdict::Fraud,
            crate::datasets::Label::Legitimate => Verdict::NotFraud,
        };

        tracing::debug!("Scored transaction: {} (p={:.4})", verdict, prediction.probability);

        Ok(Score {
            verdict,
            probability: prediction.probability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{Dataset, SyntheticConfig};
    use crate::model::SolverConfig;

    fn model() -> LogisticRegression {
        let config = SyntheticConfig {
            rows: 400,
            fraud_rate: 0.5,
            n_features: 2,
            separation: 3.0,
        };
        let train = Dataset::synthetic(&config, 3).unwrap();
        LogisticRegression::fit(&train, &SolverConfig::default()).unwrap()
    }

    fn inputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_schema_parse() {
        let schema = FeatureSchema::for_model(&model());
        assert_eq!(schema.parse(&inputs(&[("V1", " 1.5 ")])).unwrap(), vec![1.5, 0.0]);
        assert_eq!(schema.parse(&HashMap::new()).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_schema_rejects_bad_text() {
        let schema = FeatureSchema::for_model(&model());

        let err = schema.parse(&inputs(&[("V2", "12abc")])).unwrap_err();
        assert!(matches!(err, FraudError::InvalidField { ref field, .. } if field == "V2"));
        assert!(!err.to_string().contains("row"));

        assert!(schema.parse(&inputs(&[("V1", "NaN")])).is_err());
        assert!(matches!(
            schema.parse(&inputs(&[("Amount", "3")])).unwrap_err(),
            FraudError::Input { .. }
        ));
    }

    #[test]
    fn test_with_labels() {
        let labels = [("V1".to_string(), "Amount".to_string())].into_iter().collect();
        let schema = FeatureSchema::for_model(&model()).with_labels(&labels);
        assert_eq!(schema.fields[0].label, "Amount");
        assert_eq!(schema.fields[1].label, "V2");
    }

    #[test]
    fn test_classify_verdicts() {
        let context = ScoringContext::new(model(), FeatureSchema::for_model(&model())).unwrap();

        // Fraud rows are shifted +3 on V1 and -3 on V2
        let fraud = context.classify(&inputs(&[("V1", "3"), ("V2", "-3")])).unwrap();
        assert_eq!(fraud.verdict, Verdict::Fraud);
        assert!(fraud.probability > 0.5);

        let legit = context.classify(&inputs(&[("V1", "0"), ("V2", "0")])).unwrap();
        assert_eq!(legit.verdict, Verdict::NotFraud);
        assert_eq!(legit.verdict.to_string(), "Not Fraud");
    }

    #[test]
    fn test_schema_mismatch() {
        let mut schema = FeatureSchema::for_model(&model());
        schema.fields.pop();
        assert!(matches!(
            ScoringContext::new(model(), schema).unwrap_err(),
            FraudError::Config { .. }
        ));
    }

    #[test]
    fn test_load_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        persistence::save(&model(), &path).unwrap();

        let context = ScoringContext::load(&path).unwrap();
        assert_eq!(context.schema().len(), 2);

        assert!(matches!(
            ScoringContext::load(&dir.path().join("missing.json")).unwrap_err(),
            FraudError::ModelNotFound { .. }
        ));
    }
}
