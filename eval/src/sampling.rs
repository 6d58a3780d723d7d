// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Stratified train/test splitting and majority-class downsampling
//!
//! The test partition is wrapped in [`HoldoutSet`] so it cannot be confused
//! with a balanced training set: evaluation only accepts a holdout.

use crate::datasets::{Dataset, Label, LabelCounts, Transaction};
use crate::error::{FraudError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::ops::Deref;

/// Stream used for the downsampling draw, kept apart from the split stream
const DOWNSAMPLE_STREAM: u64 = 1;

/// Rows held out for evaluation with their original class proportions
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutSet(Dataset);

impl HoldoutSet {
    /// Treat a dataset that was never balanced (e.g. a separate test file) as a holdout
    pub fn from_unbalanced(dataset: Dataset) -> Self {
        Self(dataset)
    }

    pub fn dataset(&self) -> &Dataset {
        &self.0
    }

    pub fn into_inner(self) -> Dataset {
        self.0
    }
}

impl Deref for HoldoutSet {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

/// Disjoint train/test partition of a source dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: HoldoutSet,
}

pub fn validate_test_fraction(test_fraction: f64) -> Result<()> {
    if !test_fraction.is_finite() || test_fraction <= 0.0 || test_fraction >= 1.0 {
        return Err(FraudError::config(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    Ok(())
}

/// Number of test rows per label, largest-remainder allocation of `n_test`
fn allocate_test_counts(counts: LabelCounts, n_test: usize) -> [usize; 2] {
    let n = counts.total() as f64;
    let exact: Vec<f64> = Label::ALL
        .iter()
        .map(|l| n_test as f64 * counts.get(*l) as f64 / n)
        .collect();

    let mut allocation = [exact[0].floor() as usize, exact[1].floor() as usize];
    let mut remainder = n_test - allocation[0] - allocation[1];

    let mut order = [0usize, 1usize];
    order.sort_by(|&a, &b| {
        let frac_a = exact[a] - exact[a].floor();
        let frac_b = exact[b] - exact[b].floor();
        frac_b
            .partial_cmp(&frac_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| counts.get(Label::ALL[b]).cmp(&counts.get(Label::ALL[a])))
    });

    for idx in order {
        if remainder == 0 {
            break;
        }
        if allocation[idx] < counts.get(Label::ALL[idx]) {
            allocation[idx] += 1;
            remainder -= 1;
        }
    }

    allocation
}

/// Split into train and test, preserving label proportions in the test part
pub fn stratified_split(mut dataset: Dataset, test_fraction: f64, seed: u64) -> Result<Split> {
    validate_test_fraction(test_fraction)?;

    let n = dataset.len();
    let counts = dataset.label_counts();
    // Guard against 0.2 * 100 landing just above an integer
    let n_test = (test_fraction * n as f64 - 1e-9).ceil().max(0.0) as usize;

    if n_test == 0 || n_test >= n {
        return Err(FraudError::config(format!(
            "test fraction {} leaves an empty split for {} rows",
            test_fraction, n
        )));
    }

    let allocation = allocate_test_counts(counts, n_test);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut in_test = vec![false; n];

    for label in Label::ALL {
        let mut positions: Vec<usize> = dataset
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.label == label)
            .map(|(pos, _)| pos)
            .collect();
        positions.shuffle(&mut rng);
        for &pos in positions.iter().take(allocation[label.index()]) {
            in_test[pos] = true;
        }
    }

    let records = std::mem::take(&mut dataset.records);
    let (test_rows, train_rows): (Vec<(usize, Transaction)>, Vec<(usize, Transaction)>) =
        records.into_iter().enumerate().partition(|(pos, _)| in_test[*pos]);

    let train = dataset.with_records(
        &format!("{}-train", dataset.name),
        train_rows.into_iter().map(|(_, r)| r).collect(),
    );
    let test = dataset.with_records(
        &format!("{}-test", dataset.name),
        test_rows.into_iter().map(|(_, r)| r).collect(),
    );

    tracing::debug!(
        "Stratified split: train={}, test={} ({} fraud)",
        train.len(),
        test.len(),
        test.label_counts().fraud
    );

    Ok(Split {
        train,
        test: HoldoutSet(test),
    })
}

/// Downsample the majority label of `train` to the minority label's size
///
/// Fails when either label is absent: a single-class training set cannot be balanced.
pub fn downsample(mut train: Dataset, seed: u64) -> Result<Dataset> {
    let counts = train.label_counts();

    for label in Label::ALL {
        if counts.get(label) == 0 {
            return Err(FraudError::ClassAbsent {
                label: label.to_string(),
                split: "train".to_string(),
            });
        }
    }

    let name = format!("{}-balanced", train.name);

    if counts.legitimate == counts.fraud {
        return Ok(Dataset { name, ..train });
    }

    let majority = if counts.legitimate > counts.fraud {
        Label::Legitimate
    } else {
        Label::Fraud
    };
    let minority_size = counts.get(majority.other());

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(DOWNSAMPLE_STREAM);

    let records = std::mem::take(&mut train.records);
    let (majority_rows, minority_rows): (Vec<Transaction>, Vec<Transaction>) =
        records.into_iter().partition(|r| r.label == majority);

    let mut keep = vec![false; majority_rows.len()];
    for idx in rand::seq::index::sample(&mut rng, majority_rows.len(), minority_size).iter() {
        keep[idx] = true;
    }

    let mut balanced: Vec<Transaction> = majority_rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, kept)| kept.then_some(row))
        .collect();
    balanced.extend(minority_rows);

    tracing::debug!("Downsampled {} to {} rows per class", majority, minority_size);

    Ok(train.with_records(&name, balanced))
}

/// Stratified split followed by downsampling of the training part
pub fn split_and_balance(
    dataset: Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(Dataset, HoldoutSet)> {
    let Split { train, test } = stratified_split(dataset, test_fraction, seed)?;

    let train_counts = train.label_counts();
    let balanced = downsample(train, seed)?;

    tracing::info!(
        "Split and balanced: train legitimate={}, fraud={} -> balanced={}, test={}",
        train_counts.legitimate,
        train_counts.fraud,
        balanced.len(),
        test.len()
    );

    Ok((balanced, test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn labeled(n_legitimate: usize, n_fraud: usize) -> Dataset {
        let records = (0..n_legitimate + n_fraud)
            .map(|id| Transaction {
                id,
                features: vec![id as f64, (id % 7) as f64],
                label: if id < n_legitimate { Label::Legitimate } else { Label::Fraud },
            })
            .collect();
        Dataset::from_records("fixture", vec!["a".into(), "b".into()], "Class", records).unwrap()
    }

    fn ids(dataset: &Dataset) -> HashSet<usize> {
        dataset.records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_imbalanced_scenario() {
        let source = labeled(90, 10);
        let Split { train, test } = stratified_split(source.clone(), 0.2, 42).unwrap();

        assert_eq!(test.label_counts(), LabelCounts { legitimate: 18, fraud: 2 });
        assert_eq!(train.label_counts(), LabelCounts { legitimate: 72, fraud: 8 });

        let train_ids = ids(&train);
        let test_ids = ids(&test);
        assert!(train_ids.is_disjoint(&test_ids));
        assert_eq!(train_ids.union(&test_ids).count(), source.len());

        let balanced = downsample(train.clone(), 42).unwrap();
        assert_eq!(balanced.label_counts(), LabelCounts { legitimate: 8, fraud: 8 });
        assert!(ids(&balanced).is_subset(&train_ids));

        // All minority rows are kept
        let train_fraud: HashSet<usize> =
            train.records.iter().filter(|r| r.label == Label::Fraud).map(|r| r.id).collect();
        let balanced_fraud: HashSet<usize> =
            balanced.records.iter().filter(|r| r.label == Label::Fraud).map(|r| r.id).collect();
        assert_eq!(train_fraud, balanced_fraud);
    }

    #[test]
    fn test_split_and_balance_scenario() {
        let (balanced, test) = split_and_balance(labeled(90, 10), 0.2, 42).unwrap();
        assert_eq!(balanced.len(), 16);
        assert_eq!(test.len(), 20);
        assert!(ids(&balanced).is_disjoint(&ids(&test)));
    }

    #[test]
    fn test_records_are_not_altered() {
        let source = labeled(30, 6);
        let Split { train, test } = stratified_split(source.clone(), 0.25, 3).unwrap();
        for record in train.records.iter().chain(test.records.iter()) {
            assert_eq!(record, &source.records[record.id]);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let a = split_and_balance(labeled(90, 10), 0.2, 7).unwrap();
        let b = split_and_balance(labeled(90, 10), 0.2, 7).unwrap();
        assert_eq!(a.0, b.0);
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn test_minority_absent_from_train() {
        let err = split_and_balance(labeled(50, 0), 0.2, 42).unwrap_err();
        assert!(matches!(err, FraudError::ClassAbsent { ref label, .. } if label == "Fraud"));
    }

    #[test]
    fn test_inverted_majority() {
        // More fraud than legitimate rows: roles follow actual counts
        let balanced = downsample(labeled(4, 20), 1).unwrap();
        assert_eq!(balanced.label_counts(), LabelCounts { legitimate: 4, fraud: 4 });
    }

    #[test]
    fn test_already_balanced() {
        let train = labeled(5, 5);
        let balanced = downsample(train.clone(), 1).unwrap();
        assert_eq!(balanced.records, train.records);
    }

    #[test]
    fn test_invalid_fraction() {
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
            let err = stratified_split(labeled(10, 10), fraction, 1).unwrap_err();
            assert!(matches!(err, FraudError::Config { .. }), "fraction {fraction}");
        }
    }

    #[test]
    fn test_fraction_leaving_empty_split() {
        // 0.01 of 20 rows rounds up to a single test row, 0.99 leaves no train row
        assert!(stratified_split(labeled(10, 10), 0.01, 1).is_ok());
        assert!(matches!(
            stratified_split(labeled(10, 10), 0.99, 1).unwrap_err(),
            FraudError::Config { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_split_preserves_proportions(
            n_legitimate in 10usize..300,
            n_fraud in 2usize..60,
            fraction in 0.1f64..0.5,
            seed in any::<u64>(),
        ) {
            let n = n_legitimate + n_fraud;
            let Split { train, test } = stratified_split(labeled(n_legitimate, n_fraud), fraction, seed).unwrap();

            prop_assert_eq!(train.len() + test.len(), n);
            prop_assert!(ids(&train).is_disjoint(&ids(&test)));

            let n_test = test.len() as f64;
            let expected_fraud = n_test * n_fraud as f64 / n as f64;
            prop_assert!((test.label_counts().fraud as f64 - expected_fraud).abs() < 1.0);
        }

        #[test]
        fn prop_balanced_counts_equal(
            n_legitimate in 20usize..300,
            n_fraud in 5usize..40,
            seed in any::<u64>(),
        ) {
            let (balanced, _) = split_and_balance(labeled(n_legitimate, n_fraud), 0.2, seed).unwrap();
            let counts = balanced.label_counts();
            prop_assert_eq!(counts.legitimate, counts.fraud);
        }
    }
}
