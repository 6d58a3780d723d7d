// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Saving and loading fitted models
//!
//! A model file is a JSON envelope around the model parameters. The envelope
//! records a format tag and version plus a SHA-256 checksum of the model's
//! canonical JSON (keys sorted), which `load` verifies before use.

use crate::error::{FraudError, Result};
use crate::model::LogisticRegression;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const MODEL_FORMAT: &str = "fraud-eval/logistic-regression";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ModelEnvelope {
    format: String,
    format_version: u32,
    crate_version: String,
    created_at: DateTime<Utc>,
    checksum: String,
    model: serde_json::Value,
}

fn checksum(model: &serde_json::Value) -> Result<String> {
    let canonical = serde_json::to_string(model)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Write `model` to `destination`, creating missing parent directories
pub fn save(model: &LogisticRegression, destination: &Path) -> Result<()> {
    let value = serde_json::to_value(model)?;
    let envelope = ModelEnvelope {
        format: MODEL_FORMAT.to_string(),
        format_version: FORMAT_VERSION,
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: Utc::now(),
        checksum: checksum(&value)?,
        model: value,
    };
    let json = serde_json::to_string_pretty(&envelope)?;

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created model directory {}", parent.display());
        }
    }

    // Write beside the destination and rename so a failed write leaves no partial model
    let mut tmp = destination.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, destination)?;

    tracing::info!("Model saved to {} (sha256 {})", destination.display(), envelope.checksum);
    Ok(())
}

/// Read a model written by [`save`]
pub fn load(source: &Path) -> Result<LogisticRegression> {
    if !source.exists() {
        return Err(FraudError::ModelNotFound {
            path: source.to_path_buf(),
        });
    }

    let corrupt = |reason: String| FraudError::CorruptModel {
        path: source.to_path_buf(),
        reason,
    };

    let bytes = std::fs::read(source)?;
    let envelope: ModelEnvelope =
        serde_json::from_slice(&bytes).map_err(|e| corrupt(format!("unreadable envelope: {}", e)))?;

    if envelope.format != MODEL_FORMAT {
        return Err(corrupt(format!("unexpected format '{}'", envelope.format)));
    }
    if envelope.format_version != FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported format version {} (expected {})",
            envelope.format_version, FORMAT_VERSION
        )));
    }
    if checksum(&envelope.model)? != envelope.checksum {
        return Err(corrupt("checksum mismatch".to_string()));
    }

    let model: LogisticRegression = serde_json::from_value(envelope.model)
        .map_err(|e| corrupt(format!("invalid model parameters: {}", e)))?;
    model.validate().map_err(corrupt)?;

    tracing::info!(
        "Model loaded from {}: {} features, created {} by version {}",
        source.display(),
        model.n_features(),
        envelope.created_at,
        envelope.crate_version
    );

    Ok(model)
}
