//! Signature-file parsing.
//!
//! One JSON document describes one component and its patterns. Both
//! `signatures` and `patterns` are accepted for the pattern array (the
//! former is the historical name); unknown keys are ignored.

use crate::error::{Result, SnifferError};
use crate::hashes::sha256_hex;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SignatureFile {
    pub component: ComponentInfo,
    #[serde(default)]
    pub signature_metadata: SignatureMetadata,
    #[serde(alias = "signatures", default)]
    pub patterns: Vec<PatternEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub ecosystem: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    /// Pre-computed TLSH digest of the component's canonical feature corpus.
    #[serde(default)]
    pub tlsh: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternEntry {
    pub pattern: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub context: Option<String>,
}

fn default_confidence() -> f32 {
    0.7
}

/// A parsed signature file plus the content fingerprint used for idempotent
/// re-import.
#[derive(Debug)]
pub struct LoadedSignature {
    pub file: SignatureFile,
    pub fingerprint: String,
}

/// Read and parse one signature file. Malformed JSON is a validation error;
/// entries with an empty pattern text are skipped with a warning here, and
/// the full quality rules run in the store's validator at import.
pub fn load_signature_file(path: &Path) -> Result<LoadedSignature> {
    let raw = std::fs::read(path).map_err(|e| SnifferError::io(path, e))?;
    let fingerprint = sha256_hex(&raw);
    let mut file: SignatureFile = serde_json::from_slice(&raw).map_err(|e| {
        SnifferError::validation(format!("{}: not a signature file: {e}", path.display()))
    })?;

    let before = file.patterns.len();
    file.patterns.retain(|entry| !entry.pattern.trim().is_empty());
    if file.patterns.len() < before {
        warn!(
            file = %path.display(),
            skipped = before - file.patterns.len(),
            "skipped signature entries with empty pattern text"
        );
    }
    if file.component.name.trim().is_empty() {
        return Err(SnifferError::validation(format!(
            "{}: component name is empty",
            path.display()
        )));
    }
    Ok(LoadedSignature { file, fingerprint })
}
