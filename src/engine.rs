//! Per-file analysis pipeline and batch plumbing.
//!
//! Extraction and matching for one file are sequential; parallelism lives
//! at the directory level, across files. The wall-clock deadline is checked
//! cooperatively at loop boundaries in the extractors and between pipeline
//! stages; timing out discards the file's partial results.

use crate::config::AnalysisOptions;
use crate::error::{Result, SnifferError};
use crate::extract::archive::{extract_archive, WalkOutcome};
use crate::features::FeatureSet;
use crate::filetype::{detect_file_kind, FileKind};
use crate::hashes::compute_file_hashes;
use crate::matcher::{match_direct, match_fuzzy, merge_matches};
use crate::results::AnalysisResult;
use crate::store::StoreSnapshot;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cooperative per-file wall-clock budget.
#[derive(Debug)]
pub struct Deadline {
    path: PathBuf,
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn new(path: &Path, budget: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    /// No budget; used by tests and ingest paths.
    pub fn unbounded(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            started: Instant::now(),
            budget: None,
        }
    }

    pub fn check(&self) -> Result<()> {
        if let Some(budget) = self.budget {
            if self.started.elapsed() > budget {
                return Err(SnifferError::Timeout {
                    path: self.path.clone(),
                    seconds: budget.as_secs(),
                });
            }
        }
        Ok(())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Cancellation for directory batches, observed at file-dispatch
/// boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Analyze one file against a store snapshot. Recoverable failures are the
/// caller's to embed; only the pipeline's own flow lives here.
pub(crate) fn analyze_file_inner(
    path: &Path,
    options: &AnalysisOptions,
    snapshot: &StoreSnapshot,
) -> Result<AnalysisResult> {
    let deadline = Deadline::new(path, options.timeout);

    let metadata = std::fs::metadata(path).map_err(|e| SnifferError::io(path, e))?;
    if let Some(ceiling) = options.size_ceiling {
        if metadata.len() > ceiling {
            return Err(SnifferError::SizeExceeded {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: ceiling,
            });
        }
    }

    let data = std::fs::read(path).map_err(|e| SnifferError::io(path, e))?;
    let kind = detect_file_kind(path, &data);
    debug!(path = %path.display(), kind = %kind, bytes = data.len(), "classified input");

    let mut result = AnalysisResult::empty(path.display().to_string(), kind.tag());
    if kind == FileKind::Empty {
        result.analysis_time_ms = deadline.elapsed_ms();
        return Ok(result);
    }

    // Extraction.
    let mut sink = FeatureSet::new(options.max_features);
    let mut outcome = WalkOutcome::default();
    if kind.is_archive() {
        extract_archive(
            path,
            kind,
            None,
            0,
            options.recursion_cap,
            &deadline,
            &mut sink,
            &mut outcome,
        )?;
    } else if let Err(e) = crate::extract::extract_leaf(path, &data, kind, None, &mut sink) {
        match e {
            SnifferError::Format { .. } => {
                // A malformed container is still worth a raw string scan.
                warn!(path = %path.display(), error = %e, "container parse failed, scanning raw");
                crate::extract::strings::extract_strings(&data, None, &mut sink);
            }
            other => return Err(other),
        }
    }
    deadline.check()?;

    // The context filter treats a ZIP wrapping exactly one native binary
    // like the binary itself.
    let native_context = kind.is_native_binary()
        || (kind == FileKind::Zip && outcome.members_seen == 1 && outcome.native_members == 1);

    // Matching.
    let direct = match_direct(&sink, snapshot, options, native_context);
    deadline.check()?;
    let fuzzy = if options.fuzzy {
        match_fuzzy(&sink, snapshot, options)
    } else {
        Vec::new()
    };
    let matches = merge_matches(direct, fuzzy, snapshot, options);
    deadline.check()?;

    if options.include_hashes || options.include_fuzzy_hashes {
        result.file_hashes = Some(compute_file_hashes(
            &data,
            options.include_hashes,
            options.include_fuzzy_hashes,
        ));
    }

    result.features_extracted = sink.len();
    result.features_truncated = sink.truncated();
    result.matches = matches;
    result.analysis_time_ms = deadline.elapsed_ms();
    Ok(result)
}

/// Directories skipped during collection; dependency caches and VCS metadata
/// drown the signal.
const EXCLUDED_DIRS: &[&str] = &[
    ".git", ".svn", ".hg", "__pycache__", "node_modules", ".venv", "venv", ".tox",
];

/// Collect files under `root` in lexicographic order, honoring the
/// include-glob set when present.
pub(crate) fn collect_files(root: &Path, include_patterns: &[String]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                let name = entry.file_name().to_string_lossy();
                return !EXCLUDED_DIRS.contains(&name.as_ref()) && !name.starts_with(".git");
            }
            true
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| {
            include_patterns.is_empty()
                || include_patterns.iter().any(|pattern| glob_match(pattern, path))
        })
        .collect();
    files.sort();
    files
}

/// Minimal glob: `*` matches any run of characters, everything else is
/// literal. Patterns without a separator match the file name; patterns with
/// one match the full path.
fn glob_match(pattern: &str, path: &Path) -> bool {
    let target = if pattern.contains('/') {
        path.to_string_lossy().into_owned()
    } else {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    wildcard_match(pattern.as_bytes(), target.as_bytes())
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            wildcard_match(&pattern[1..], text)
                || (!text.is_empty() && wildcard_match(pattern, &text[1..]))
        }
        (Some(p), Some(t)) if p == t => wildcard_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
