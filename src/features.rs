//! Feature set and normalizer.
//!
//! Extractors push raw strings here; the set applies the normalization
//! contract (dedup preserving first-seen order, length bounds, stop-list,
//! cap) so the matcher always sees a canonical, bounded input.

use crate::config::{MAX_STRING_LENGTH, MIN_STRING_LENGTH};
use crate::stoplist::is_stop_word;
use rustc_hash::FxHashSet;

/// One extracted feature. `source` is the archive-relative path of the member
/// it came from, used as match evidence; `None` for top-level content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub text: String,
    pub source: Option<String>,
}

impl Feature {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), source: None }
    }

    pub fn with_source(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Some(source.into()),
        }
    }
}

/// Deduplicated, insertion-ordered, size-capped feature sequence.
#[derive(Debug)]
pub struct FeatureSet {
    features: Vec<Feature>,
    seen: FxHashSet<String>,
    cap: usize,
    truncated: bool,
}

impl FeatureSet {
    pub fn new(cap: usize) -> Self {
        Self {
            features: Vec::new(),
            seen: FxHashSet::default(),
            cap,
            truncated: false,
        }
    }

    /// Apply the normalization rules and insert. Returns true if the feature
    /// was kept. Once the cap is reached every further insert is discarded
    /// and the set is marked truncated.
    pub fn insert(&mut self, mut feature: Feature) -> bool {
        if feature.text.len() > MAX_STRING_LENGTH {
            let mut cut = MAX_STRING_LENGTH;
            while !feature.text.is_char_boundary(cut) {
                cut -= 1;
            }
            feature.text.truncate(cut);
        }
        if feature.text.len() < MIN_STRING_LENGTH {
            return false;
        }
        if !keeps_past_stoplist(&feature.text) {
            return false;
        }
        if self.seen.contains(&feature.text) {
            return false;
        }
        if self.features.len() >= self.cap {
            self.truncated = true;
            return false;
        }
        self.seen.insert(feature.text.clone());
        self.features.push(feature);
        true
    }

    pub fn insert_text(&mut self, text: impl Into<String>) -> bool {
        self.insert(Feature::new(text))
    }

    /// True once the cap rejected at least one feature.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// True once the set can accept nothing more; extractors use this to
    /// abort early.
    pub fn is_full(&self) -> bool {
        self.features.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn contains(&self, text: &str) -> bool {
        self.seen.contains(text)
    }

    /// The canonical byte payload fed to the fuzzy hasher: feature texts in
    /// first-seen order joined by newlines. Stable for a stable input.
    pub fn canonical_payload(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        for (i, f) in self.features.iter().enumerate() {
            if i > 0 {
                payload.push(b'\n');
            }
            payload.extend_from_slice(f.text.as_bytes());
        }
        payload
    }
}

/// Stop-listed features are dropped unless an underscore or non-ASCII byte
/// marks them as more than a bare generic token (`av_` survives, `init`
/// does not).
fn keeps_past_stoplist(text: &str) -> bool {
    if text.contains('_') || !text.is_ascii() {
        return true;
    }
    !is_stop_word(text)
}

/// Normalize a raw feature sequence into a fresh set. Running the output
/// through again yields an identical sequence.
pub fn normalize(raw: impl IntoIterator<Item = Feature>, cap: usize) -> FeatureSet {
    let mut set = FeatureSet::new(cap);
    for feature in raw {
        set.insert(feature);
    }
    set
}
