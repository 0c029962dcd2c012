//! Direct matching: features against stored patterns.
//!
//! Every feature is checked for exact equality; features of eight bytes or
//! more are additionally checked for contained patterns, so a long symbol
//! string still hits a short unique pattern inside it. Scores aggregate per
//! component over distinct patterns.

use crate::config::AnalysisOptions;
use crate::features::FeatureSet;
use crate::store::StoreSnapshot;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Contains-hits carry less certainty than exact equality.
const SUBSTRING_WEIGHT: f32 = 0.7;
/// Features shorter than this skip the contains lookup.
const MIN_CONTAINS_LENGTH: usize = 8;

/// Aggregated direct-match result for one component.
#[derive(Debug, Clone)]
pub struct DirectHit {
    pub component_id: i64,
    pub confidence: f32,
    /// Distinct patterns matched.
    pub hit_count: usize,
    /// Sample of matched pattern texts, in pattern-id order.
    pub patterns: Vec<String>,
    /// Source annotations of the features that matched, deduplicated,
    /// first-seen order.
    pub sources: Vec<String>,
}

/// Run the direct matcher. `native_context` activates the native-vs-mobile
/// filter when the options ask for it.
pub fn match_direct(
    features: &FeatureSet,
    snapshot: &StoreSnapshot,
    options: &AnalysisOptions,
    native_context: bool,
) -> Vec<DirectHit> {
    // Best weight seen per pattern, plus the source of the feature that hit.
    let mut pattern_hits: FxHashMap<u32, (f32, Option<String>)> = FxHashMap::default();

    for feature in features.iter() {
        for &idx in snapshot.lookup_exact(&feature.text) {
            let weight = snapshot.pattern(idx).confidence;
            update_hit(&mut pattern_hits, idx, weight, feature.source.as_deref());
        }

        if feature.text.len() >= MIN_CONTAINS_LENGTH {
            for idx in snapshot.lookup_contains(&feature.text) {
                let weight = SUBSTRING_WEIGHT * snapshot.pattern(idx).confidence;
                update_hit(&mut pattern_hits, idx, weight, feature.source.as_deref());
            }
        }
    }

    // Aggregate per component. Pattern ids are visited in sorted order so
    // the evidence lists are stable.
    let mut ordered: Vec<(u32, (f32, Option<String>))> = pattern_hits.into_iter().collect();
    ordered.sort_unstable_by_key(|(idx, _)| *idx);

    struct Accumulator {
        score: f32,
        patterns: Vec<String>,
        sources: Vec<String>,
    }
    let mut per_component: FxHashMap<i64, Accumulator> = FxHashMap::default();
    for (idx, (weight, source)) in ordered {
        let pattern = snapshot.pattern(idx);
        let acc = per_component
            .entry(pattern.component_id)
            .or_insert_with(|| Accumulator {
                score: 0.0,
                patterns: Vec::new(),
                sources: Vec::new(),
            });
        acc.score += weight;
        acc.patterns.push(pattern.text.clone());
        if let Some(source) = source {
            if !acc.sources.iter().any(|s| s == &source) {
                acc.sources.push(source);
            }
        }
    }

    let mut hits: Vec<DirectHit> = Vec::new();
    let mut component_ids: Vec<i64> = per_component.keys().copied().collect();
    component_ids.sort_unstable();

    for component_id in component_ids {
        let Some(acc) = per_component.remove(&component_id) else { continue };
        let Some(component) = snapshot.component(component_id) else { continue };

        // Mobile-only components cannot legitimately appear inside a pure
        // native executable.
        if options.filter_by_context && native_context && component.ecosystem.is_mobile() {
            debug!(component = %component.name, "dropped by native-context filter");
            continue;
        }

        let hit_count = acc.patterns.len();
        if hit_count < options.min_matches {
            continue;
        }

        let denominator = (0.15 * component.pattern_count as f32).max(3.0);
        let confidence = (acc.score / denominator).min(1.0);
        if confidence < options.threshold {
            continue;
        }

        hits.push(DirectHit {
            component_id,
            confidence,
            hit_count,
            patterns: acc.patterns,
            sources: acc.sources,
        });
    }
    hits
}

fn update_hit(
    hits: &mut FxHashMap<u32, (f32, Option<String>)>,
    idx: u32,
    weight: f32,
    source: Option<&str>,
) {
    let entry = hits.entry(idx).or_insert((0.0, None));
    if weight > entry.0 {
        entry.0 = weight;
    }
    if entry.1.is_none() {
        entry.1 = source.map(str::to_string);
    }
}
