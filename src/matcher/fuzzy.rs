//! Fuzzy matching over TLSH digests.
//!
//! The feature set's canonical payload is hashed with the same algorithm
//! used at ingest; stored component digests within the distance threshold
//! become candidate matches. Distance maps to confidence through a
//! piecewise-linear table; the breakpoints are tunables, not invariants.

use crate::config::{AnalysisOptions, MIN_FUZZY_INPUT};
use crate::features::FeatureSet;
use crate::store::StoreSnapshot;
use tracing::debug;

/// `(distance, confidence)` breakpoints, linearly interpolated.
const CONFIDENCE_BREAKPOINTS: [(u32, f32); 4] = [(0, 1.00), (30, 0.92), (70, 0.78), (100, 0.60)];

#[derive(Debug, Clone)]
pub struct FuzzyHit {
    pub component_id: i64,
    pub distance: u32,
    pub confidence: f32,
}

/// Compare the feature payload against every stored digest. Emits nothing
/// when the payload is too small for a meaningful digest.
pub fn match_fuzzy(
    features: &FeatureSet,
    snapshot: &StoreSnapshot,
    options: &AnalysisOptions,
) -> Vec<FuzzyHit> {
    let payload = features.canonical_payload();
    if payload.len() < MIN_FUZZY_INPUT {
        debug!(bytes = payload.len(), "feature payload below fuzzy minimum");
        return Vec::new();
    }
    let Ok(digest) = crate::tlsh_util::hash_buf(&payload) else {
        debug!("payload not hashable");
        return Vec::new();
    };
    let digest = digest.hash();

    // Digests are stored one per component, in component-id order; the
    // output inherits that determinism.
    let mut hits = Vec::new();
    for (component_id, stored) in snapshot.lsh_digests() {
        let Ok(distance) = crate::tlsh_util::compare(&digest, stored) else { continue };
        if distance >= options.fuzzy_threshold {
            continue;
        }
        let confidence = distance_to_confidence(distance);
        if confidence < options.threshold {
            continue;
        }
        hits.push(FuzzyHit {
            component_id: *component_id,
            distance,
            confidence,
        });
    }
    hits
}

/// Interpolate the breakpoint table; distances past the last breakpoint
/// keep its confidence (they are normally discarded by the threshold first).
pub fn distance_to_confidence(distance: u32) -> f32 {
    let table = &CONFIDENCE_BREAKPOINTS;
    if distance <= table[0].0 {
        return table[0].1;
    }
    for pair in table.windows(2) {
        let (lo_d, lo_c) = pair[0];
        let (hi_d, hi_c) = pair[1];
        if distance <= hi_d {
            let span = (hi_d - lo_d) as f32;
            let t = (distance - lo_d) as f32 / span;
            return lo_c + t * (hi_c - lo_c);
        }
    }
    table[table.len() - 1].1
}
