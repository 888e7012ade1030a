//! Slot/label scoring and conflict-free assignment
//!
//! Every (slot, label) pair is scored by fusing the best fingerprint and the
//! best histogram similarity over the template's normal and alt variants.
//! Admitted candidates are claimed greedily in descending score order, which
//! never assigns a slot or a label twice but is not guaranteed to find the
//! globally best pairing.

use super::config::RecognizerConfig;
use super::features::{SlotFeatures, similarity};
use super::state::RecognitionState;
use super::template::Template;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// A scored (slot, label) pair, produced fresh every scan
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMatch {
    pub slot: usize,
    pub label: String,
    pub fused_score: f32,
    pub fingerprint_sim: f32,
    pub histogram_sim: f32,
}

/// Scores crops against templates
pub struct SlotMatcher {
    config: RecognizerConfig,
}

impl SlotMatcher {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Fused score of one crop against one template
    pub fn score(&self, slot: usize, crop: &SlotFeatures, template: &Template) -> CandidateMatch {
        let fingerprint_sim = similarity(&crop.fingerprint, &template.normal_fingerprint)
            .max(similarity(&crop.fingerprint, &template.alt_fingerprint));

        let (histogram_sim, fused_score) = match &template.normal_histogram {
            Some(normal) => {
                let alt = template.alt_histogram.as_ref().unwrap_or(normal);
                let hist = similarity(&crop.histogram, normal).max(similarity(&crop.histogram, alt));
                let fused = self.config.fingerprint_weight * fingerprint_sim
                    + self.config.histogram_weight * hist;
                (hist, fused)
            }
            // Legacy templates without histograms score on the fingerprint alone.
            None => (0.0, fingerprint_sim),
        };

        CandidateMatch {
            slot,
            label: template.label.clone(),
            fused_score,
            fingerprint_sim,
            histogram_sim,
        }
    }

    /// Score every slot crop against every template and keep the candidates
    /// above the slot's floor.
    pub fn candidates(
        &self,
        crops: &[(usize, SlotFeatures)],
        templates: &[Arc<Template>],
    ) -> Vec<CandidateMatch> {
        let mut out = Vec::new();
        for (slot, features) in crops {
            let floor = self.config.floor_for(*slot);
            for template in templates {
                let candidate = self.score(*slot, features, template);
                if self.config.debug_enabled {
                    log::debug!(
                        "slot {} vs '{}': fused={:.3} fp={:.3} hist={:.3}",
                        slot,
                        candidate.label,
                        candidate.fused_score,
                        candidate.fingerprint_sim,
                        candidate.histogram_sim
                    );
                }
                if candidate.fused_score > floor {
                    out.push(candidate);
                }
            }
        }
        out
    }

    /// Score and assign in one step
    pub fn recognize(
        &self,
        crops: &[(usize, SlotFeatures)],
        templates: &[Arc<Template>],
    ) -> RecognitionState {
        assign(self.candidates(crops, templates))
    }
}

/// Descending by score; ties broken by slot then label so identical inputs
/// always produce identical output.
fn rank(a: &CandidateMatch, b: &CandidateMatch) -> Ordering {
    b.fused_score
        .partial_cmp(&a.fused_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.slot.cmp(&b.slot))
        .then_with(|| a.label.cmp(&b.label))
}

/// Greedy conflict-free assignment over pooled candidates.
pub fn assign(mut candidates: Vec<CandidateMatch>) -> RecognitionState {
    candidates.retain(|c| c.fused_score.is_finite());
    candidates.sort_by(rank);

    let mut claimed_slots = HashSet::new();
    let mut claimed_labels = HashSet::new();
    let mut assignments = Vec::new();

    for candidate in candidates {
        if claimed_slots.contains(&candidate.slot) || claimed_labels.contains(&candidate.label) {
            continue;
        }
        claimed_slots.insert(candidate.slot);
        claimed_labels.insert(candidate.label.clone());
        assignments.push((candidate.slot, candidate.label));
    }

    RecognitionState::from_assignments(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::features::{FINGERPRINT_LEN, HISTOGRAM_LEN};

    fn candidate(slot: usize, label: &str, score: f32) -> CandidateMatch {
        CandidateMatch {
            slot,
            label: label.to_string(),
            fused_score: score,
            fingerprint_sim: score,
            histogram_sim: score,
        }
    }

    fn unit(len: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; len];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_greedy_scenario() {
        let state = assign(vec![
            candidate(0, "A", 0.90),
            candidate(1, "A", 0.85),
            candidate(1, "B", 0.80),
            candidate(2, "C", 0.70),
        ]);

        assert_eq!(state.label_at(0), Some("A"));
        assert_eq!(state.label_at(1), Some("B"));
        assert_eq!(state.label_at(2), Some("C"));
        assert_eq!(state.label_at(3), None);
        assert_eq!(state.label_at(4), None);
        assert_eq!(state.slot_of("D"), None);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let input = vec![
            candidate(2, "B", 0.8),
            candidate(0, "A", 0.8),
            candidate(1, "A", 0.8),
            candidate(0, "B", 0.8),
        ];
        let first = assign(input.clone());
        for _ in 0..10 {
            let mut shuffled = input.clone();
            shuffled.reverse();
            assert_eq!(assign(shuffled), first);
        }
        assert_eq!(first.label_at(0), Some("A"));
        assert_eq!(first.label_at(2), Some("B"));
    }

    #[test]
    fn test_no_double_assignment() {
        let mut input = Vec::new();
        for slot in 0..5 {
            for label in ["A", "B", "C"] {
                input.push(candidate(slot, label, 0.6 + slot as f32 * 0.01));
            }
        }
        let state = assign(input);
        assert_eq!(state.len(), 3);
        let labels: HashSet<_> = state.assignments().map(|(_, l)| l.to_string()).collect();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_score_uses_best_variant_and_weights() {
        let matcher = SlotMatcher::new(&RecognizerConfig::default());
        let template = Template {
            label: "A".to_string(),
            normal_fingerprint: unit(FINGERPRINT_LEN, 0),
            alt_fingerprint: unit(FINGERPRINT_LEN, 1),
            normal_histogram: Some(unit(HISTOGRAM_LEN, 0)),
            alt_histogram: Some(unit(HISTOGRAM_LEN, 2)),
        };
        // Crop matches the alt fingerprint and neither histogram.
        let crop = SlotFeatures {
            fingerprint: unit(FINGERPRINT_LEN, 1),
            histogram: unit(HISTOGRAM_LEN, 5),
        };
        let c = matcher.score(0, &crop, &template);
        assert!((c.fingerprint_sim - 1.0).abs() < 1e-6);
        assert_eq!(c.histogram_sim, 0.0);
        assert!((c.fused_score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_legacy_template_scores_on_fingerprint() {
        let matcher = SlotMatcher::new(&RecognizerConfig::default());
        let template = Template {
            label: "A".to_string(),
            normal_fingerprint: unit(FINGERPRINT_LEN, 0),
            alt_fingerprint: unit(FINGERPRINT_LEN, 0),
            normal_histogram: None,
            alt_histogram: None,
        };
        let crop = SlotFeatures {
            fingerprint: unit(FINGERPRINT_LEN, 0),
            histogram: unit(HISTOGRAM_LEN, 0),
        };
        let c = matcher.score(3, &crop, &template);
        assert!((c.fused_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_candidates_respect_floors() {
        let mut config = RecognizerConfig::default();
        config.similarity_floor = 0.7;
        config.preview_similarity_floor = 0.5;
        let matcher = SlotMatcher::new(&config);
        let template = Arc::new(Template {
            label: "A".to_string(),
            normal_fingerprint: unit(FINGERPRINT_LEN, 0),
            alt_fingerprint: unit(FINGERPRINT_LEN, 0),
            normal_histogram: Some(unit(HISTOGRAM_LEN, 0)),
            alt_histogram: Some(unit(HISTOGRAM_LEN, 0)),
        });
        // Fingerprint matches, histogram does not: fused = 0.6.
        let features = SlotFeatures {
            fingerprint: unit(FINGERPRINT_LEN, 0),
            histogram: unit(HISTOGRAM_LEN, 1),
        };
        let crops = vec![(0, features.clone()), (4, features)];
        let found = matcher.candidates(&crops, &[template]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slot, 4);
    }
}
