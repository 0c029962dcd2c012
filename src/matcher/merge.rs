//! Unifies direct and fuzzy hits into the final ranked match list.

use crate::config::AnalysisOptions;
use crate::matcher::direct::DirectHit;
use crate::matcher::fuzzy::FuzzyHit;
use crate::results::{ComponentMatch, MatchEvidence, MatchMethod};
use crate::store::StoreSnapshot;
use std::collections::BTreeMap;

/// Pattern texts kept as evidence per match.
const MAX_EVIDENCE_PATTERNS: usize = 20;

pub fn merge_matches(
    direct: Vec<DirectHit>,
    fuzzy: Vec<FuzzyHit>,
    snapshot: &StoreSnapshot,
    options: &AnalysisOptions,
) -> Vec<ComponentMatch> {
    // Keyed by component id: deterministic union regardless of input order.
    let mut merged: BTreeMap<i64, (Option<DirectHit>, Option<FuzzyHit>)> = BTreeMap::new();
    for hit in direct {
        let component_id = hit.component_id;
        merged.entry(component_id).or_default().0 = Some(hit);
    }
    for hit in fuzzy {
        let component_id = hit.component_id;
        merged.entry(component_id).or_default().1 = Some(hit);
    }

    let mut matches: Vec<ComponentMatch> = Vec::new();
    for (component_id, (direct_hit, fuzzy_hit)) in merged {
        let Some(component) = snapshot.component(component_id) else { continue };

        let direct_confidence = direct_hit.as_ref().map(|h| h.confidence).unwrap_or(0.0);
        let fuzzy_confidence = fuzzy_hit.as_ref().map(|h| h.confidence).unwrap_or(0.0);
        let confidence = direct_confidence.max(fuzzy_confidence);
        if confidence < options.threshold {
            continue;
        }

        let match_method = match (&direct_hit, &fuzzy_hit) {
            (Some(_), Some(_)) => MatchMethod::DirectFuzzy,
            (Some(_), None) => MatchMethod::Direct,
            (None, Some(_)) => MatchMethod::Fuzzy,
            (None, None) => continue,
        };

        let mut evidence = MatchEvidence::default();
        if let Some(hit) = &direct_hit {
            evidence.pattern_count = hit.hit_count;
            evidence.matched_patterns = hit
                .patterns
                .iter()
                .take(MAX_EVIDENCE_PATTERNS)
                .cloned()
                .collect();
            evidence.source_files = hit.sources.clone();
        }
        if let Some(hit) = &fuzzy_hit {
            evidence.fuzzy_distance = Some(hit.distance);
        }

        matches.push(ComponentMatch {
            component: ComponentMatch::display_name(&component.name, &component.version),
            name: component.name.clone(),
            version: if component.version.is_empty() {
                "unknown".to_string()
            } else {
                component.version.clone()
            },
            license: component.license.clone(),
            publisher: component.publisher.clone(),
            ecosystem: component.ecosystem,
            confidence,
            match_method,
            evidence,
        });
    }

    // Confidence descending, component name ascending as the tiebreaker.
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });

    if let Some(top) = options.top_matches {
        matches.truncate(top);
    }
    matches
}
