//! Persistent signature store.
//!
//! A single-file SQLite database holds components, their patterns, the
//! pattern→component inverted index, a trigram auxiliary index for substring
//! lookups, and optional per-component TLSH digests. Writes are batched in
//! transactions and performed offline (import); analysis reads go through an
//! immutable in-memory [`StoreSnapshot`] loaded once per engine, which
//! carries the trigram index rows alongside the patterns they point at.

pub mod validator;

use crate::config::MIN_FUZZY_INPUT;
use crate::error::{Result, SnifferError};
use crate::results::Ecosystem;
use crate::sigfile::LoadedSignature;
use rusqlite::{params, Connection, OpenFlags};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use validator::{clip_confidence, validate_pattern};

/// Component row as stored.
#[derive(Debug, Clone)]
pub struct ComponentRow {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub license: Option<String>,
    pub publisher: Option<String>,
    pub ecosystem: Ecosystem,
    pub family: Option<String>,
    pub description: Option<String>,
    /// Total accepted patterns for this component; drives score
    /// normalization in the direct matcher.
    pub pattern_count: usize,
}

/// Pattern row as stored.
#[derive(Debug, Clone)]
pub struct PatternRow {
    pub id: i64,
    pub component_id: i64,
    pub text: String,
    pub confidence: f32,
    pub context: Option<String>,
}

/// Summary printed by `signatures status`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStatus {
    pub path: String,
    pub components: usize,
    pub patterns: usize,
    pub lsh_digests: usize,
    pub last_import: Option<String>,
}

/// Outcome of importing one signature file.
#[derive(Debug)]
pub struct ImportSummary {
    pub component: String,
    pub accepted: usize,
    pub rejected: usize,
    /// True when the file's fingerprint was already present and the import
    /// was a no-op.
    pub unchanged: bool,
}

pub struct SignatureStore {
    conn: Connection,
    path: PathBuf,
}

impl SignatureStore {
    /// Create the store (and parent directories) if missing, then open
    /// read-write. Used by import and status paths.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SnifferError::io(parent, e))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| SnifferError::store(format!("cannot open {}: {e}", path.display())))?;
        init_schema(&conn)?;
        Ok(Self { conn, path: path.to_path_buf() })
    }

    /// Open an existing store read-only for analysis. A missing or
    /// schema-less store is a fatal error: every worker depends on it.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| SnifferError::store(format!("cannot open {}: {e}", path.display())))?;
        let ok: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'components'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| SnifferError::store(e.to_string()))?;
        if ok == 0 {
            return Err(SnifferError::store(format!(
                "{} is not a signature store (missing schema)",
                path.display()
            )));
        }
        Ok(Self { conn, path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Import a batch of parsed signature files. Each file is one
    /// transaction; a file whose fingerprint is already recorded is skipped,
    /// so re-importing the same files leaves the store byte-identical.
    pub fn import(&mut self, loaded: &LoadedSignature) -> Result<ImportSummary> {
        let component_name = loaded.file.component.name.clone();

        let already: Option<String> = self
            .conn
            .query_row(
                "SELECT imported_at FROM imported_files WHERE fingerprint = ?1",
                params![loaded.fingerprint],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if already.is_some() {
            debug!(component = %component_name, "signature file unchanged, skipping");
            return Ok(ImportSummary {
                component: component_name,
                accepted: 0,
                rejected: 0,
                unchanged: true,
            });
        }

        // Validate up front so a rejected file leaves no trace.
        let mut accepted: Vec<(&str, f32, Option<&str>)> = Vec::new();
        let mut seen_in_file: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        let mut rejected = 0usize;
        for entry in &loaded.file.patterns {
            let text = entry.pattern.as_str();
            if !seen_in_file.insert(text) {
                rejected += 1;
                continue;
            }
            match validate_pattern(text) {
                Ok(()) => accepted.push((
                    text,
                    clip_confidence(entry.confidence),
                    entry.context.as_deref(),
                )),
                Err(reason) => {
                    debug!(pattern = text, %reason, "rejected pattern");
                    rejected += 1;
                }
            }
        }
        if accepted.is_empty() {
            return Err(SnifferError::validation(format!(
                "no usable patterns for component '{component_name}' \
                 ({rejected} rejected)"
            )));
        }

        let info = &loaded.file.component;
        let version = info.version.clone().unwrap_or_else(|| "unknown".to_string());
        let ecosystem = info
            .ecosystem
            .as_deref()
            .map(Ecosystem::parse)
            .unwrap_or_default();
        let now = chrono::Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;

        // Re-ingesting a changed file for the same component replaces it,
        // index rows included (patterns cascade, the indices do not).
        let old_id: Option<i64> = tx
            .query_row(
                "SELECT id FROM components WHERE name = ?1 AND version = ?2",
                params![info.name, version],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        if let Some(old_id) = old_id {
            tx.execute(
                "DELETE FROM pattern_trigrams WHERE pattern_id IN \
                 (SELECT id FROM patterns WHERE component_id = ?1)",
                params![old_id],
            )?;
            tx.execute("DELETE FROM pattern_index WHERE component_id = ?1", params![old_id])?;
            tx.execute("DELETE FROM components WHERE id = ?1", params![old_id])?;
        }
        tx.execute(
            "INSERT INTO components (name, version, license, publisher, ecosystem, family, \
             description, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                info.name,
                version,
                info.license,
                info.publisher,
                ecosystem.as_str(),
                info.family,
                info.description,
                now
            ],
        )?;
        let component_id = tx.last_insert_rowid();

        let mut cross_component_skips = 0usize;
        {
            let mut owner_stmt = tx.prepare(
                "SELECT c.id, c.family FROM pattern_index pi \
                 JOIN components c ON c.id = pi.component_id WHERE pi.text = ?1",
            )?;
            let mut insert_pattern = tx.prepare(
                "INSERT INTO patterns (component_id, text, confidence, context) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut insert_index = tx
                .prepare("INSERT INTO pattern_index (text, component_id) VALUES (?1, ?2)")?;
            let mut insert_gram = tx
                .prepare("INSERT INTO pattern_trigrams (gram, pattern_id) VALUES (?1, ?2)")?;

            for (text, confidence, context) in &accepted {
                // A pattern shared across components is only legitimate
                // within a recognized family.
                let owners: Vec<(i64, Option<String>)> = owner_stmt
                    .query_map(params![text], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<_, _>>()?;
                let conflict = owners.iter().any(|(owner_id, owner_family)| {
                    *owner_id != component_id
                        && (owner_family.is_none()
                            || info.family.is_none()
                            || owner_family.as_deref() != info.family.as_deref())
                });
                if conflict {
                    warn!(
                        pattern = text,
                        component = %info.name,
                        "pattern already owned outside this family, skipping"
                    );
                    cross_component_skips += 1;
                    continue;
                }

                insert_pattern.execute(params![component_id, text, confidence, context])?;
                let pattern_id = tx.last_insert_rowid();
                insert_index.execute(params![text, component_id])?;
                for gram in trigrams(text) {
                    insert_gram.execute(params![gram.as_slice(), pattern_id])?;
                }
            }
        }

        let kept = accepted.len() - cross_component_skips;
        if kept == 0 {
            tx.execute("DELETE FROM components WHERE id = ?1", params![component_id])?;
            return Err(SnifferError::validation(format!(
                "every pattern for '{component_name}' is owned by another component"
            )));
        }

        // Digest preference: the signature author's TLSH, else one computed
        // over the accepted pattern corpus when it is rich enough.
        let digest = loaded
            .file
            .signature_metadata
            .tlsh
            .clone()
            .or_else(|| compute_corpus_digest(accepted.iter().map(|(t, _, _)| *t)));
        if let Some(digest) = digest {
            tx.execute(
                "INSERT OR REPLACE INTO lsh_digests (component_id, digest) VALUES (?1, ?2)",
                params![component_id, digest],
            )?;
        }

        tx.execute(
            "INSERT INTO imported_files (fingerprint, imported_at) VALUES (?1, ?2)",
            params![loaded.fingerprint, now],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_import', ?1)",
            params![now],
        )?;
        tx.commit()?;

        info!(
            component = %component_name,
            accepted = kept,
            rejected,
            "imported signature file"
        );
        Ok(ImportSummary {
            component: component_name,
            accepted: kept,
            rejected: rejected + cross_component_skips,
            unchanged: false,
        })
    }

    /// Drop and rebuild the inverted and trigram indices from the pattern
    /// table.
    pub fn rebuild_indices(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM pattern_index", [])?;
        tx.execute("DELETE FROM pattern_trigrams", [])?;
        {
            let mut stmt = tx.prepare("SELECT id, component_id, text FROM patterns ORDER BY id")?;
            let mut insert_index =
                tx.prepare("INSERT INTO pattern_index (text, component_id) VALUES (?1, ?2)")?;
            let mut insert_gram =
                tx.prepare("INSERT INTO pattern_trigrams (gram, pattern_id) VALUES (?1, ?2)")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (pattern_id, component_id, text) = row?;
                insert_index.execute(params![text, component_id])?;
                for gram in trigrams(&text) {
                    insert_gram.execute(params![gram.as_slice(), pattern_id])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let components: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM components", [], |r| r.get::<_, i64>(0))? as usize;
        let patterns: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get::<_, i64>(0))? as usize;
        let lsh_digests: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM lsh_digests", [], |r| r.get::<_, i64>(0))?
                as usize;
        let last_import: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_import'",
                [],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(StoreStatus {
            path: self.path.display().to_string(),
            components,
            patterns,
            lsh_digests,
            last_import,
        })
    }

    /// Load everything the matcher needs into an immutable snapshot.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let mut components = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT c.id, c.name, c.version, c.license, c.publisher, c.ecosystem, \
                        c.family, c.description, \
                        (SELECT COUNT(*) FROM patterns p WHERE p.component_id = c.id) \
                 FROM components c ORDER BY c.id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ComponentRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    version: row.get(2)?,
                    license: row.get(3)?,
                    publisher: row.get(4)?,
                    ecosystem: Ecosystem::parse(&row.get::<_, String>(5)?),
                    family: row.get(6)?,
                    description: row.get(7)?,
                    pattern_count: row.get::<_, i64>(8)? as usize,
                })
            })?;
            for row in rows {
                components.push(row?);
            }
        }

        let mut patterns = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT id, component_id, text, confidence, context FROM patterns ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(PatternRow {
                    id: row.get(0)?,
                    component_id: row.get(1)?,
                    text: row.get(2)?,
                    confidence: row.get::<_, f64>(3)? as f32,
                    context: row.get(4)?,
                })
            })?;
            for row in rows {
                patterns.push(row?);
            }
        }

        let mut digests = Vec::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT component_id, digest FROM lsh_digests ORDER BY component_id",
            )?;
            let rows =
                stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                digests.push(row?);
            }
        }

        // The trigram table was written at ingest; its rows become the
        // in-memory candidate index, keyed to pattern positions.
        let pattern_position: FxHashMap<i64, u32> = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i as u32))
            .collect();
        let mut contains_index: FxHashMap<[u8; 3], Vec<u32>> = FxHashMap::default();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT gram, pattern_id FROM pattern_trigrams ORDER BY pattern_id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows {
                let (gram, pattern_id) = row?;
                let (Ok(gram), Some(&position)) =
                    (<[u8; 3]>::try_from(gram.as_slice()), pattern_position.get(&pattern_id))
                else {
                    continue;
                };
                contains_index.entry(gram).or_default().push(position);
            }
        }

        Ok(StoreSnapshot::new(components, patterns, digests, contains_index))
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         CREATE TABLE IF NOT EXISTS components (
             id          INTEGER PRIMARY KEY,
             name        TEXT NOT NULL,
             version     TEXT NOT NULL DEFAULT 'unknown',
             license     TEXT,
             publisher   TEXT,
             ecosystem   TEXT NOT NULL DEFAULT 'unknown',
             family      TEXT,
             description TEXT,
             created_at  TEXT NOT NULL,
             UNIQUE(name, version)
         );
         CREATE TABLE IF NOT EXISTS patterns (
             id           INTEGER PRIMARY KEY,
             component_id INTEGER NOT NULL REFERENCES components(id) ON DELETE CASCADE,
             text         TEXT NOT NULL,
             confidence   REAL NOT NULL,
             context      TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_patterns_component ON patterns(component_id);
         CREATE TABLE IF NOT EXISTS pattern_index (
             text         TEXT NOT NULL,
             component_id INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_pattern_index_text ON pattern_index(text);
         CREATE TABLE IF NOT EXISTS pattern_trigrams (
             gram       BLOB NOT NULL,
             pattern_id INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_trigram_gram ON pattern_trigrams(gram);
         CREATE TABLE IF NOT EXISTS lsh_digests (
             component_id INTEGER PRIMARY KEY REFERENCES components(id) ON DELETE CASCADE,
             digest       TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS imported_files (
             fingerprint TEXT PRIMARY KEY,
             imported_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS meta (
             key   TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );",
    )?;
    Ok(())
}

/// Byte trigrams of a pattern, used by the contains-candidate index. Stored
/// as raw byte triples so windows that split multi-byte UTF-8 survive
/// round-tripping through the database.
fn trigrams(text: &str) -> Vec<[u8; 3]> {
    let bytes = text.as_bytes();
    if bytes.len() < 3 {
        return Vec::new();
    }
    let mut grams: Vec<[u8; 3]> = bytes.windows(3).map(|w| [w[0], w[1], w[2]]).collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}

/// Digest of a component's pattern corpus, when it is rich enough for the
/// fuzzy layer to be meaningful.
fn compute_corpus_digest<'a>(patterns: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut corpus = Vec::new();
    for (i, text) in patterns.enumerate() {
        if i > 0 {
            corpus.push(b'\n');
        }
        corpus.extend_from_slice(text.as_bytes());
    }
    if corpus.len() < MIN_FUZZY_INPUT {
        return None;
    }
    crate::tlsh_util::hash_buf(&corpus).ok().map(|h| h.hash())
}

/// Immutable in-memory view of the store, shared read-only across workers.
pub struct StoreSnapshot {
    components: Vec<ComponentRow>,
    component_index: FxHashMap<i64, usize>,
    patterns: Vec<PatternRow>,
    exact: FxHashMap<String, Vec<u32>>,
    /// Trigram → pattern positions, loaded from the `pattern_trigrams`
    /// table written at ingest.
    contains_index: FxHashMap<[u8; 3], Vec<u32>>,
    digests: Vec<(i64, String)>,
}

impl StoreSnapshot {
    fn new(
        components: Vec<ComponentRow>,
        patterns: Vec<PatternRow>,
        digests: Vec<(i64, String)>,
        contains_index: FxHashMap<[u8; 3], Vec<u32>>,
    ) -> Self {
        let component_index = components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id, i))
            .collect();
        let mut exact: FxHashMap<String, Vec<u32>> = FxHashMap::default();
        for (i, p) in patterns.iter().enumerate() {
            exact.entry(p.text.clone()).or_default().push(i as u32);
        }
        Self {
            components,
            component_index,
            patterns,
            exact,
            contains_index,
            digests,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn component(&self, id: i64) -> Option<&ComponentRow> {
        self.component_index.get(&id).map(|&i| &self.components[i])
    }

    /// Components in id order.
    pub fn iter_components(&self) -> impl Iterator<Item = &ComponentRow> {
        self.components.iter()
    }

    /// `(component_id, digest)` pairs in component-id order.
    pub fn lsh_digests(&self) -> &[(i64, String)] {
        &self.digests
    }

    /// Exact-equality pattern hits for a feature.
    pub fn lookup_exact(&self, feature: &str) -> &[u32] {
        self.exact.get(feature).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Patterns that are proper substrings of `feature`. Candidates come
    /// from the trigram index built at ingest; each is verified with a
    /// literal contains check before being reported.
    pub fn lookup_contains(&self, feature: &str) -> Vec<u32> {
        let bytes = feature.as_bytes();
        if bytes.len() < 3 {
            return Vec::new();
        }

        // Every gram of a contained pattern occurs in the feature, so the
        // union over the feature's windows is a superset of the answer.
        let mut candidates = Vec::new();
        for window in bytes.windows(3) {
            let gram = [window[0], window[1], window[2]];
            if let Some(positions) = self.contains_index.get(&gram) {
                candidates.extend_from_slice(positions);
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        candidates
            .into_iter()
            .filter(|&idx| {
                let pattern = &self.patterns[idx as usize];
                pattern.text.len() < feature.len() && feature.contains(&pattern.text)
            })
            .collect()
    }

    pub fn pattern(&self, idx: u32) -> &PatternRow {
        &self.patterns[idx as usize]
    }
}
