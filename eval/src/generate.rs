// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Generate a synthetic labeled transaction table
//!
//! Usage:
//!   generate-transactions --output data/raw_data/creditcard.csv --rows 50000 --fraud-rate 0.002

use anyhow::{Context, Result};
use clap::Parser;
use fraud_eval::datasets::{Dataset, SyntheticConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "generate-transactions")]
#[command(about = "Write a synthetic transaction CSV for training and testing")]
#[command(version)]
struct Args {
    /// Destination CSV
    #[arg(short, long)]
    output: PathBuf,

    /// Number of rows
    #[arg(short, long, default_value_t = 2000)]
    rows: usize,

    /// Fraction of rows labeled fraud
    #[arg(long, default_value_t = 0.05)]
    fraud_rate: f64,

    /// Number of feature columns
    #[arg(long, default_value_t = 8)]
    features: usize,

    /// Mean offset of fraud rows on each feature
    #[arg(long, default_value_t = 1.5)]
    separation: f64,

    /// Random seed for reproducibility
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = SyntheticConfig {
        rows: args.rows,
        fraud_rate: args.fraud_rate,
        n_features: args.features,
        separation: args.separation,
    };
    let dataset = Dataset::synthetic(&config, args.seed).context("failed to generate transactions")?;
    dataset
        .save_csv(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    let counts = dataset.label_counts();
    println!(
        "Wrote {} transactions ({} fraud) to {}",
        counts.total(),
        counts.fraud,
        args.output.display()
    );

    Ok(())
}
