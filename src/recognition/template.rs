//! Calibrated templates and the store that holds them

use super::features::{SlotFeatures, desaturate};
use super::labels::LabelSet;
use image::RgbImage;
use std::collections::HashMap;
use std::sync::Arc;

/// Reference feature set for one label.
///
/// The alt variant models the darkened/desaturated rendering an item gets
/// on screen when it cannot be played yet. Histograms are optional only for
/// records persisted before histograms existed; such templates are scored by
/// fingerprint alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub label: String,
    pub normal_fingerprint: Vec<f32>,
    pub alt_fingerprint: Vec<f32>,
    pub normal_histogram: Option<Vec<f32>>,
    pub alt_histogram: Option<Vec<f32>>,
}

impl Template {
    /// Build a template from an image; the alt variant comes from a
    /// desaturated copy of the same image.
    pub fn from_image(label: impl Into<String>, image: &RgbImage, alt_desaturation: f32) -> Self {
        let normal = SlotFeatures::extract(image);
        let alt = SlotFeatures::extract(&desaturate(image, alt_desaturation));
        Self::from_features(label, normal, alt)
    }

    pub fn from_features(label: impl Into<String>, normal: SlotFeatures, alt: SlotFeatures) -> Self {
        Self {
            label: label.into(),
            normal_fingerprint: normal.fingerprint,
            alt_fingerprint: alt.fingerprint,
            normal_histogram: Some(normal.histogram),
            alt_histogram: Some(alt.histogram),
        }
    }

    pub fn has_histograms(&self) -> bool {
        self.normal_histogram.is_some()
    }
}

/// Per-label templates for the active label set.
///
/// Each entry is an `Arc<Template>` replaced as a whole, so a reader holding
/// an entry never sees a mix of old and new vectors for one label.
#[derive(Debug, Default)]
pub struct TemplateStore {
    labels: Option<LabelSet>,
    templates: HashMap<String, Arc<Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(labels: LabelSet) -> Self {
        Self {
            labels: Some(labels),
            templates: HashMap::new(),
        }
    }

    pub fn labels(&self) -> Option<&LabelSet> {
        self.labels.as_ref()
    }

    /// Switch the active label set. Returns true if the set changed, in which
    /// case every template was dropped.
    pub fn set_labels(&mut self, labels: LabelSet) -> bool {
        if self.labels.as_ref().is_some_and(|l| l.same_as(&labels)) {
            return false;
        }
        self.labels = Some(labels);
        self.clear();
        true
    }

    /// Store a template, replacing any previous one for the same label.
    /// Returns false (and stores nothing) for labels outside the active set.
    pub fn calibrated(&mut self, template: Template) -> bool {
        let known = self
            .labels
            .as_ref()
            .is_some_and(|l| l.contains(&template.label));
        if !known {
            log::warn!(
                "Ignoring template for '{}': not in the active label set",
                template.label
            );
            return false;
        }
        self.templates
            .insert(template.label.clone(), Arc::new(template));
        true
    }

    pub fn remove(&mut self, label: &str) -> bool {
        self.templates.remove(label).is_some()
    }

    /// Drop every template
    pub fn clear(&mut self) {
        self.templates.clear();
    }

    pub fn get(&self, label: &str) -> Option<Arc<Template>> {
        self.templates.get(label).cloned()
    }

    pub fn count(&self) -> usize {
        self.templates.len()
    }

    pub fn is_calibrated(&self, min_labels: usize) -> bool {
        self.count() >= min_labels
    }

    /// Calibrated labels in label-set order
    pub fn calibrated_labels(&self) -> Vec<String> {
        match &self.labels {
            Some(labels) => labels
                .names()
                .iter()
                .filter(|n| self.templates.contains_key(n.as_str()))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Templates in label-set order, for deterministic iteration
    pub fn templates(&self) -> Vec<Arc<Template>> {
        match &self.labels {
            Some(labels) => labels
                .names()
                .iter()
                .filter_map(|n| self.templates.get(n).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::features::{FINGERPRINT_LEN, HISTOGRAM_LEN};
    use image::Rgb;

    fn labels() -> LabelSet {
        LabelSet::new(["A", "B", "C", "D", "E", "F", "G", "H"]).unwrap()
    }

    fn template(label: &str, shade: u8) -> Template {
        let image = RgbImage::from_pixel(16, 16, Rgb([shade, 40, 200]));
        Template::from_image(label, &image, 0.6)
    }

    #[test]
    fn test_template_from_image_has_all_vectors() {
        let t = template("A", 120);
        assert_eq!(t.normal_fingerprint.len(), FINGERPRINT_LEN);
        assert_eq!(t.alt_fingerprint.len(), FINGERPRINT_LEN);
        assert_eq!(t.normal_histogram.as_ref().unwrap().len(), HISTOGRAM_LEN);
        assert_eq!(t.alt_histogram.as_ref().unwrap().len(), HISTOGRAM_LEN);
        assert_ne!(t.normal_fingerprint, t.alt_fingerprint);
    }

    #[test]
    fn test_calibrated_overwrites() {
        let mut store = TemplateStore::with_labels(labels());
        assert!(store.calibrated(template("A", 10)));
        assert!(store.calibrated(template("A", 250)));
        assert_eq!(store.count(), 1);
        assert_eq!(
            store.get("A").unwrap().normal_fingerprint,
            template("A", 250).normal_fingerprint
        );
    }

    #[test]
    fn test_unknown_label_rejected() {
        let mut store = TemplateStore::with_labels(labels());
        assert!(!store.calibrated(template("Z", 10)));
        assert_eq!(store.count(), 0);

        let mut unlabeled = TemplateStore::new();
        assert!(!unlabeled.calibrated(template("A", 10)));
    }

    #[test]
    fn test_clear_resets_calibration() {
        let mut store = TemplateStore::with_labels(labels());
        for l in ["A", "B", "C", "D"] {
            store.calibrated(template(l, 50));
        }
        assert!(store.is_calibrated(4));

        store.clear();
        assert!(!store.is_calibrated(4));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_set_labels_clears_only_on_change() {
        let mut store = TemplateStore::with_labels(labels());
        store.calibrated(template("A", 50));

        assert!(!store.set_labels(labels()));
        assert_eq!(store.count(), 1);

        let other = LabelSet::new(["A", "B", "C", "D", "E", "F", "G", "X"]).unwrap();
        assert!(store.set_labels(other));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_calibrated_labels_in_label_order() {
        let mut store = TemplateStore::with_labels(labels());
        store.calibrated(template("F", 50));
        store.calibrated(template("B", 50));
        assert_eq!(store.calibrated_labels(), vec!["B".to_string(), "F".to_string()]);
    }
}
