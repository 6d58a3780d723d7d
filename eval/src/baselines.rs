// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reference classifiers for judging the fitted model
//!
//! Implements:
//! - Random baseline (uniform random predictions)
//! - Majority class baseline (always predict the most common training label)
//! - Stratified baseline (predict proportional to the training label distribution)
//!
//! Baselines ignore the feature values apart from checking their width.

use crate::datasets::{Dataset, Label};
use crate::error::Result;
use crate::model::{check_width, Classifier, Prediction};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Random baseline: predicts uniformly at random
#[derive(Debug, Clone)]
pub struct RandomBaseline {
    seed: u64,
    n_features: usize,
}

impl RandomBaseline {
    pub fn fit(train: &Dataset, seed: u64) -> Self {
        Self {
            seed,
            n_features: train.n_features(),
        }
    }

    fn draw(rng: &mut ChaCha8Rng) -> Prediction {
        let probability: f64 = rng.gen();
        Prediction {
            label: if probability > 0.5 { Label::Fraud } else { Label::Legitimate },
            probability,
        }
    }
}

impl Classifier for RandomBaseline {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_width(self.n_features, features)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        Ok(Self::draw(&mut rng))
    }

    // One RNG per batch so rows get independent draws
    fn predict_batch(&self, dataset: &Dataset) -> Result<Vec<Prediction>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        dataset
            .records
            .iter()
            .map(|r| {
                check_width(self.n_features, &r.features)?;
                Ok(Self::draw(&mut rng))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "Random"
    }

    fn description(&self) -> &str {
        "Uniform random predictions"
    }
}

/// Majority class baseline: always predicts the most common training label
#[derive(Debug, Clone)]
pub struct MajorityBaseline {
    majority_label: Label,
    fraud_rate: f64,
    n_features: usize,
}

impl MajorityBaseline {
    pub fn fit(train: &Dataset) -> Self {
        let counts = train.label_counts();
        Self {
            majority_label: if counts.fraud > counts.legitimate {
                Label::Fraud
            } else {
                Label::Legitimate
            },
            fraud_rate: counts.fraud_rate(),
            n_features: train.n_features(),
        }
    }
}

impl Classifier for MajorityBaseline {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_width(self.n_features, features)?;
        Ok(Prediction {
            label: self.majority_label,
            probability: self.fraud_rate,
        })
    }

    fn name(&self) -> &str {
        "Majority"
    }

    fn description(&self) -> &str {
        "Always predicts the majority class from training data"
    }
}

/// Stratified baseline: predicts fraud with the training fraud rate
#[derive(Debug, Clone)]
pub struct StratifiedBaseline {
    seed: u64,
    fraud_rate: f64,
    n_features: usize,
}

impl StratifiedBaseline {
    pub fn fit(train: &Dataset, seed: u64) -> Self {
        Self {
            seed,
            fraud_rate: train.label_counts().fraud_rate(),
            n_features: train.n_features(),
        }
    }

    fn draw(&self, rng: &mut ChaCha8Rng) -> Prediction {
        let roll: f64 = rng.gen();
        Prediction {
            label: if roll < self.fraud_rate {
                Label::Fraud
            } else {
                Label::Legitimate
            },
            probability: self.fraud_rate,
        }
    }
}

impl Classifier for StratifiedBaseline {
    fn predict(&self, features: &[f64]) -> Result<Prediction> {
        check_width(self.n_features, features)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        Ok(self.draw(&mut rng))
    }

    fn predict_batch(&self, dataset: &Dataset) -> Result<Vec<Prediction>> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        dataset
            .records
            .iter()
            .map(|r| {
                check_width(self.n_features, &r.features)?;
                Ok(self.draw(&mut rng))
            })
            .collect()
    }

    fn name(&self) -> &str {
        "Stratified"
    }

    fn description(&self) -> &str {
        "Predicts proportionally to training class distribution"
    }
}

/// Fit every baseline on the same training set
pub fn all_baselines(train: &Dataset, seed: u64) -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(RandomBaseline::fit(train, seed)),
        Box::new(MajorityBaseline::fit(train)),
        Box::new(StratifiedBaseline::fit(train, seed)),
    ]
}
