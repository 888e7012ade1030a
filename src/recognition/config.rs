//! Configuration for recognition, calibration and scanning

use super::error::{RecognitionError, RecognitionResult};
use super::region::SlotLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Weight of fingerprint similarity in the fused score
    pub fingerprint_weight: f32,
    /// Weight of histogram similarity in the fused score
    pub histogram_weight: f32,
    /// Minimum fused score for a primary slot candidate (exclusive)
    pub similarity_floor: f32,
    /// Minimum fused score for the preview slot (exclusive)
    pub preview_similarity_floor: f32,
    /// Desaturation used to synthesize the alt (dimmed) template variant
    pub alt_desaturation: f32,
    /// Opaque background that transparent reference pixels are flattened onto
    pub reference_background: [u8; 3],
    /// Templates required before scanning may start
    pub min_calibrated_labels: usize,
    /// Period between scans in milliseconds
    pub scan_interval_ms: u64,
    /// Consecutive missing frames before a warning is logged
    pub frame_miss_warn_threshold: u32,
    /// Slot rectangles as fractions of the frame
    pub layout: SlotLayout,
    /// Debug mode flag
    pub debug_enabled: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            fingerprint_weight: 0.6,
            histogram_weight: 0.4,
            similarity_floor: 0.5,
            preview_similarity_floor: 0.5,
            alt_desaturation: 0.6,
            reference_background: [18, 18, 24],
            min_calibrated_labels: 4,
            scan_interval_ms: 250,
            frame_miss_warn_threshold: 20,
            layout: SlotLayout::default(),
            debug_enabled: false,
        }
    }
}

impl RecognizerConfig {
    pub fn load(path: &Path) -> RecognitionResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RecognizerConfig =
            toml::from_str(&content).map_err(|source| RecognitionError::ConfigParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RecognitionResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Floor for a given slot
    pub fn floor_for(&self, slot: usize) -> f32 {
        if slot == super::region::PREVIEW_SLOT {
            self.preview_similarity_floor
        } else {
            self.similarity_floor
        }
    }

    pub fn validate(&self) -> RecognitionResult<()> {
        let invalid = |description: String| Err(RecognitionError::InvalidConfig { description });

        let weights = [self.fingerprint_weight, self.histogram_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("fusion weights must be finite and non-negative".to_string());
        }
        if self.fingerprint_weight + self.histogram_weight <= 0.0 {
            return invalid("at least one fusion weight must be positive".to_string());
        }
        for (name, value) in [
            ("similarity_floor", self.similarity_floor),
            ("preview_similarity_floor", self.preview_similarity_floor),
            ("alt_desaturation", self.alt_desaturation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{} must be within 0..=1, got {}", name, value));
            }
        }
        if self.scan_interval_ms == 0 {
            return invalid("scan_interval_ms must be positive".to_string());
        }
        if self.min_calibrated_labels == 0 {
            return invalid("min_calibrated_labels must be positive".to_string());
        }
        if let Some(slot) = self.layout.slots.iter().position(|r| !r.is_valid()) {
            return invalid(format!("slot {} region is degenerate", slot));
        }
        Ok(())
    }
}

/// Faster polling for hosts that can afford the CPU
pub fn create_fast_scan_config() -> RecognizerConfig {
    RecognizerConfig {
        scan_interval_ms: 100,
        frame_miss_warn_threshold: 50,
        ..RecognizerConfig::default()
    }
}

/// Higher floors: fewer, more certain assignments
pub fn create_strict_config() -> RecognizerConfig {
    RecognizerConfig {
        similarity_floor: 0.75,
        preview_similarity_floor: 0.7,
        ..RecognizerConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::region::SlotRegion;

    #[test]
    fn test_defaults() {
        let config = RecognizerConfig::default();
        assert_eq!(config.fingerprint_weight, 0.6);
        assert_eq!(config.histogram_weight, 0.4);
        assert_eq!(config.similarity_floor, 0.5);
        assert_eq!(config.min_calibrated_labels, 4);
        assert!(config.validate().is_ok());
        assert!(create_fast_scan_config().validate().is_ok());
        assert!(create_strict_config().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RecognizerConfig = toml::from_str(
            r#"
            similarity_floor = 0.65
            scan_interval_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.similarity_floor, 0.65);
        assert_eq!(config.scan_interval(), Duration::from_millis(500));
        assert_eq!(config.histogram_weight, 0.4);
        assert_eq!(config.layout, SlotLayout::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "hand-recognizer-config-{}.toml",
            std::process::id()
        ));
        let config = create_strict_config();
        config.save(&path).unwrap();
        let loaded = RecognizerConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RecognizerConfig::default();
        config.similarity_floor = 1.5;
        assert!(config.validate().is_err());

        let mut config = RecognizerConfig::default();
        config.fingerprint_weight = 0.0;
        config.histogram_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = RecognizerConfig::default();
        config.layout.slots[0] = SlotRegion::new(0.5, 0.5, 0.0, 0.1);
        assert!(config.validate().is_err());

        let mut config = RecognizerConfig::default();
        config.scan_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_floor_for_preview() {
        let mut config = RecognizerConfig::default();
        config.preview_similarity_floor = 0.3;
        assert_eq!(config.floor_for(0), 0.5);
        assert_eq!(config.floor_for(4), 0.3);
    }
}
