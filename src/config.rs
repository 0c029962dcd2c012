use crate::error::{Result, SnifferError};
use std::path::PathBuf;
use std::time::Duration;

/// Default minimum confidence a match must reach to be emitted.
pub const DEFAULT_THRESHOLD: f32 = 0.5;
/// Default TLSH distance cutoff; distances at or above this are discarded.
pub const DEFAULT_FUZZY_THRESHOLD: u32 = 70;
/// Default cap on the deduplicated feature set per analysis.
pub const DEFAULT_FEATURE_CAP: usize = 150_000;
/// Default per-file wall-clock budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Maximum archive nesting depth.
pub const DEFAULT_RECURSION_CAP: usize = 5;
/// Per-archive member count cap.
pub const MAX_ARCHIVE_MEMBERS: usize = 10_000;
/// Per-member decompressed size cap (100 MB).
pub const MAX_MEMBER_SIZE: u64 = 100 * 1024 * 1024;
/// Total decompressed size cap per archive (1 GB).
pub const MAX_ARCHIVE_TOTAL_SIZE: u64 = 1024 * 1024 * 1024;
/// Printable-run caps for the binary string scanner.
pub const MIN_STRING_LENGTH: usize = 4;
pub const MAX_STRING_LENGTH: usize = 512;
pub const MAX_STRINGS_PER_FILE: usize = 50_000;
/// Minimum canonical feature payload for the fuzzy layer and fuzzy file hashes.
pub const MIN_FUZZY_INPUT: usize = 256;

/// Options accepted by [`crate::Sniffer::analyze`]. All live values; the
/// engine keeps no mutable state outside the store handle.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Minimum confidence for an emitted match.
    pub threshold: f32,
    /// Enable the TLSH fuzzy matcher.
    pub fuzzy: bool,
    /// TLSH distance cutoff.
    pub fuzzy_threshold: u32,
    /// Minimum distinct patterns a component must hit.
    pub min_matches: usize,
    /// Attach MD5/SHA1/SHA256 of the input to the result.
    pub include_hashes: bool,
    /// Attach TLSH/ssdeep of the input to the result.
    pub include_fuzzy_hashes: bool,
    /// Cap on the deduplicated feature set.
    pub max_features: usize,
    /// Skip files larger than this many bytes, when set.
    pub size_ceiling: Option<u64>,
    /// Per-file wall-clock budget.
    pub timeout: Duration,
    /// Archive recursion cap.
    pub recursion_cap: usize,
    /// Glob patterns restricting which files a directory analysis visits.
    pub include_patterns: Vec<String>,
    /// Worker threads for directory analysis. `None` = available parallelism.
    pub workers: Option<usize>,
    /// Apply the native-vs-mobile context filter. The filter is heuristic and
    /// can over-filter cross-platform artifacts; disable to keep everything.
    pub filter_by_context: bool,
    /// Keep only the top N matches per file, when set.
    pub top_matches: Option<usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            fuzzy: true,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            min_matches: 1,
            include_hashes: false,
            include_fuzzy_hashes: false,
            max_features: DEFAULT_FEATURE_CAP,
            size_ceiling: None,
            timeout: DEFAULT_TIMEOUT,
            recursion_cap: DEFAULT_RECURSION_CAP,
            include_patterns: Vec::new(),
            workers: None,
            filter_by_context: true,
            top_matches: None,
        }
    }
}

impl AnalysisOptions {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(SnifferError::validation(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.max_features == 0 {
            return Err(SnifferError::validation("max_features must be greater than 0"));
        }
        if self.timeout.is_zero() {
            return Err(SnifferError::validation("timeout must be greater than 0"));
        }
        if self.min_matches == 0 {
            return Err(SnifferError::validation("min_matches must be at least 1"));
        }
        Ok(())
    }
}

/// Location of the signature store. Defaults to `<data dir>/binsniff/signatures.db`.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("binsniff")
        .join("signatures.db")
}
