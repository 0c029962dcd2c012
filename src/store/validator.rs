//! Ingest-time pattern validation.
//!
//! Patterns too generic to discriminate between components are rejected
//! here, once, at import. Matching never re-validates.

use crate::stoplist::{is_primitive_type, is_stop_word};

/// Why a pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    StopWord,
    PrimitiveType,
    TooGeneric,
    DuplicateInFile,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort => write!(f, "shorter than the minimum length"),
            Self::StopWord => write!(f, "generic stop-word"),
            Self::PrimitiveType => write!(f, "primitive type name"),
            Self::TooGeneric => write!(f, "plain lowercase word with no separators"),
            Self::DuplicateInFile => write!(f, "duplicate of an earlier pattern in the file"),
        }
    }
}

/// Check a single pattern against the quality rules. Duplicate detection is
/// the caller's job (it needs the per-file accepted set).
pub fn validate_pattern(text: &str) -> Result<(), RejectReason> {
    let len = text.chars().count();

    // Library-prefix allowance: `av_`, `png_`, `x264_` style patterns are
    // short but high-signal.
    let prefix_pattern = text.ends_with('_') && len >= 4;
    if len < 6 && !prefix_pattern {
        return Err(RejectReason::TooShort);
    }

    if is_stop_word(text) {
        return Err(RejectReason::StopWord);
    }
    if is_primitive_type(text) {
        return Err(RejectReason::PrimitiveType);
    }

    // An all-letters lowercase word with no underscore, slash, colon, or
    // mixed case matches far too much English-ish rodata.
    let all_lower_letters = text.chars().all(|c| c.is_ascii_lowercase());
    if all_lower_letters && !text.contains(['_', '/', ':']) {
        return Err(RejectReason::TooGeneric);
    }

    Ok(())
}

/// Clip an imported confidence into the accepted band.
pub fn clip_confidence(confidence: f32) -> f32 {
    confidence.clamp(0.5, 1.0)
}
