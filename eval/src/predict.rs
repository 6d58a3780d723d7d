// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Score a single transaction against a saved model
//!
//! Usage:
//!   fraud-predict --model models/logistic_regression_model.json --field V1=-1.35 --field V14=-4.2
//!   fraud-predict --model models/logistic_regression_model.json --list-fields

use anyhow::{bail, Context, Result};
use clap::Parser;
use fraud_eval::serving::ScoringContext;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fraud-predict")]
#[command(about = "Classify a transaction with a trained fraud model")]
#[command(version)]
struct Args {
    /// Saved model file
    #[arg(short, long, default_value = "models/logistic_regression_model.json")]
    model: PathBuf,

    /// Feature value as name=value; omitted features use their default
    #[arg(short, long = "field", value_name = "NAME=VALUE")]
    fields: Vec<String>,

    /// Print the fields the model expects and exit
    #[arg(long)]
    list_fields: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_fields(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut inputs = HashMap::new();
    for entry in raw {
        let Some((name, value)) = entry.split_once('=') else {
            bail!("expected NAME=VALUE, got '{}'", entry);
        };
        let name = name.trim();
        if inputs.insert(name.to_string(), value.to_string()).is_some() {
            bail!("field '{}' given more than once", name);
        }
    }
    Ok(inputs)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let context = ScoringContext::load(&args.model)
        .with_context(|| format!("failed to load model from {}", args.model.display()))?;

    if args.list_fields {
        for field in &context.schema().fields {
            println!("{:<20} default={}", field.label, field.default);
        }
        return Ok(());
    }

    let inputs = parse_fields(&args.fields)?;
    let score = context.classify(&inputs).context("failed to score transaction")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&score)?);
    } else {
        println!("Prediction: {}", score.verdict);
        println!("Fraud probability: {:.4}", score.probability);
    }

    Ok(())
}
