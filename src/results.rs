//! Analysis result model. Everything here serializes with serde so external
//! renderers (table/CSV/SBOM) can consume results without touching the engine.

use crate::error::{ErrorKind, SnifferError};
use serde::{Deserialize, Serialize};

/// Ecosystem a component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Native,
    Jvm,
    Android,
    Ios,
    Npm,
    Pypi,
    Go,
    #[default]
    Unknown,
}

impl Ecosystem {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "native" | "c" | "c++" | "cpp" => Self::Native,
            "jvm" | "java" | "maven" => Self::Jvm,
            "android" => Self::Android,
            "ios" | "cocoapods" => Self::Ios,
            "npm" | "node" => Self::Npm,
            "pypi" | "python" => Self::Pypi,
            "go" | "golang" => Self::Go,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Jvm => "jvm",
            Self::Android => "android",
            Self::Ios => "ios",
            Self::Npm => "npm",
            Self::Pypi => "pypi",
            Self::Go => "go",
            Self::Unknown => "unknown",
        }
    }

    /// Ecosystems that cannot plausibly appear inside a pure native binary.
    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Android | Self::Ios)
    }
}

/// How a component was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Direct,
    Fuzzy,
    DirectFuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fuzzy => "fuzzy",
            Self::DirectFuzzy => "direct+fuzzy",
        }
    }
}

/// Evidence backing a match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchEvidence {
    /// Distinct patterns hit by the direct matcher.
    pub pattern_count: usize,
    /// A sample of the matched pattern texts, capped for readability.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub matched_patterns: Vec<String>,
    /// Archive-relative paths the matched features came from.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub source_files: Vec<String>,
    /// TLSH distance when the fuzzy layer contributed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fuzzy_distance: Option<u32>,
}

/// One detected component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentMatch {
    /// Display name; `name@version`, with the suffix omitted when the
    /// version is `unknown`.
    pub component: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publisher: Option<String>,
    pub ecosystem: Ecosystem,
    pub confidence: f32,
    pub match_method: MatchMethod,
    pub evidence: MatchEvidence,
}

impl ComponentMatch {
    /// `name@version`, with `unknown` versions left off.
    pub fn display_name(name: &str, version: &str) -> String {
        if version.is_empty() || version == "unknown" {
            name.to_string()
        } else {
            format!("{name}@{version}")
        }
    }
}

/// Optional cryptographic / fuzzy hashes of the input file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileHashes {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sha256: Option<String>,
    /// TLSH; absent for inputs under the minimum length.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tlsh: Option<String>,
    /// ssdeep; absent for inputs under the minimum length.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ssdeep: Option<String>,
}

/// Error attached to a per-file result. Carries the kind tag and a short
/// cause; batches keep going.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&SnifferError> for ResultError {
    fn from(e: &SnifferError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Result of analyzing one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub file_path: String,
    pub file_type: String,
    pub features_extracted: usize,
    /// True when the feature cap discarded extractor output.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub features_truncated: bool,
    pub analysis_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ResultError>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file_hashes: Option<FileHashes>,
    pub matches: Vec<ComponentMatch>,
}

impl AnalysisResult {
    pub fn empty(path: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            file_path: path.into(),
            file_type: file_type.into(),
            features_extracted: 0,
            features_truncated: false,
            analysis_time_ms: 0,
            error: None,
            file_hashes: None,
            matches: Vec::new(),
        }
    }

    /// A result standing in for a file that could not be analyzed.
    pub fn failed(path: impl Into<String>, error: &SnifferError) -> Self {
        let mut result = Self::empty(path, "unknown");
        result.error = Some(ResultError::from(error));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_omits_unknown_version() {
        assert_eq!(ComponentMatch::display_name("libpng", "1.6.37"), "libpng@1.6.37");
        assert_eq!(ComponentMatch::display_name("libpng", "unknown"), "libpng");
        assert_eq!(ComponentMatch::display_name("libpng", ""), "libpng");
    }

    #[test]
    fn ecosystem_parse_round_trips() {
        assert_eq!(Ecosystem::parse("native"), Ecosystem::Native);
        assert_eq!(Ecosystem::parse("ANDROID"), Ecosystem::Android);
        assert_eq!(Ecosystem::parse("whatever"), Ecosystem::Unknown);
        assert!(Ecosystem::Ios.is_mobile());
        assert!(!Ecosystem::Native.is_mobile());
    }

    #[test]
    fn failed_result_carries_kind() {
        let err = crate::error::SnifferError::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let result = AnalysisResult::failed("/nope", &err);
        assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::IoError);
        assert!(result.matches.is_empty());
    }
}
