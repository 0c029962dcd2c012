//! binsniff - detect open-source components embedded in binary artifacts.
//!
//! Features (short strings) are extracted from the input, normalized, and
//! matched against a persistent signature store; a TLSH fuzzy layer catches
//! near-miss builds that share no exact pattern. Results are ranked by
//! confidence and fully deterministic for a fixed input and store.
//!
//! # Example
//!
//! ```no_run
//! use binsniff::{AnalysisOptions, Sniffer};
//!
//! let sniffer = Sniffer::open("signatures.db").unwrap();
//! let result = sniffer.analyze("libplayer.so", &AnalysisOptions::default()).unwrap();
//! for m in &result.matches {
//!     println!("{} {:.0}% ({})", m.component, m.confidence * 100.0, m.match_method.as_str());
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod features;
pub mod filetype;
pub mod hashes;
pub mod matcher;
pub mod results;
pub mod sigfile;
pub mod stoplist;
pub mod store;
pub mod tlsh_util;

pub use config::{default_store_path, AnalysisOptions};
pub use engine::CancelToken;
pub use error::{ErrorKind, Result, SnifferError};
pub use filetype::{detect_file_kind, FileKind};
pub use results::{AnalysisResult, ComponentMatch, Ecosystem, MatchMethod};
pub use store::{SignatureStore, StoreStatus};

use rayon::prelude::*;
use std::path::Path;
use store::StoreSnapshot;
use tracing::info;

/// Engine façade. Holds the only process-wide state: the signature-store
/// read handle and its in-memory snapshot, shared read-only across workers.
pub struct Sniffer {
    snapshot: StoreSnapshot,
}

impl Sniffer {
    /// Open a signature store read-only and load its snapshot. Store
    /// problems are fatal here; nothing can be matched without one.
    pub fn open<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store = SignatureStore::open_read_only(store_path.as_ref())?;
        let snapshot = store.snapshot()?;
        info!(
            store = %store_path.as_ref().display(),
            components = snapshot.iter_components().count(),
            "signature store loaded"
        );
        Ok(Self { snapshot })
    }

    /// Open the store at the default per-user location.
    pub fn open_default() -> Result<Self> {
        Self::open(default_store_path())
    }

    /// Build a façade from an already-open store (ingest-then-analyze
    /// flows).
    pub fn from_store(store: &SignatureStore) -> Result<Self> {
        Ok(Self { snapshot: store.snapshot()? })
    }

    /// Analyze a single file. Recoverable problems (unreadable input,
    /// malformed containers, timeouts, size ceiling) come back as a result
    /// with an `error` field; only store-level failures are `Err`.
    pub fn analyze<P: AsRef<Path>>(
        &self,
        path: P,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResult> {
        options.validate()?;
        let path = path.as_ref();
        match engine::analyze_file_inner(path, options, &self.snapshot) {
            Ok(result) => Ok(result),
            Err(e) if e.is_recoverable() => {
                Ok(AnalysisResult::failed(path.display().to_string(), &e))
            }
            Err(e) => Err(e),
        }
    }

    /// Analyze every file under a directory. Results come back in
    /// lexicographic path order, one per file; a single file's failure
    /// never disturbs the others.
    pub fn analyze_directory<P: AsRef<Path>>(
        &self,
        path: P,
        options: &AnalysisOptions,
    ) -> Result<Vec<AnalysisResult>> {
        self.analyze_directory_with_cancel(path, options, &CancelToken::new())
    }

    /// Directory analysis with a cancel token, observed at each file
    /// dispatch boundary.
    pub fn analyze_directory_with_cancel<P: AsRef<Path>>(
        &self,
        path: P,
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<AnalysisResult>> {
        options.validate()?;
        let root = path.as_ref();
        if !root.is_dir() {
            return Err(SnifferError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }

        let files = engine::collect_files(root, &options.include_patterns);
        info!(root = %root.display(), files = files.len(), "directory analysis");

        let run = |files: &[std::path::PathBuf]| -> Vec<AnalysisResult> {
            files
                .par_iter()
                .filter_map(|file| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(match engine::analyze_file_inner(file, options, &self.snapshot) {
                        Ok(result) => result,
                        Err(e) => AnalysisResult::failed(file.display().to_string(), &e),
                    })
                })
                .collect()
        };

        let results = match options.workers {
            Some(workers) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .build()
                    .map_err(|e| SnifferError::store(format!("worker pool: {e}")))?;
                pool.install(|| run(&files))
            }
            None => run(&files),
        };
        // par_iter preserves input order, so results are already sorted by
        // path; asserting the invariant is cheap.
        debug_assert!(results.windows(2).all(|w| w[0].file_path <= w[1].file_path));
        Ok(results)
    }

    /// Access to the loaded snapshot for diagnostic tooling.
    pub fn snapshot(&self) -> &StoreSnapshot {
        &self.snapshot
    }
}
