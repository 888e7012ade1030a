//! Template calibration strategies
//!
//! Two interchangeable ways to populate the template store:
//! - reference images: one canonical image per label from a provider,
//!   fetched concurrently, flattened onto a dark background
//! - vision assist: live slot crops labeled by a vision provider, with the
//!   templates computed from the crops themselves

use super::config::RecognizerConfig;
use super::error::{RecognitionError, RecognitionResult};
use super::features::composite_on_background;
use super::labels::LabelSet;
use super::sources::{ReferenceImageProvider, VisionLabeler};
use super::template::Template;
use image::RgbImage;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Outcome of one calibration pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationReport {
    /// Labels whose template was (re)computed, in label-set order
    pub calibrated: Vec<String>,
    /// (label or slot, reason) for every unit that produced no template
    pub failed: Vec<(String, String)>,
}

impl CalibrationReport {
    pub fn success_count(&self) -> usize {
        self.calibrated.len()
    }
}

/// Decode a reference image and build its template.
///
/// Images with an alpha channel are flattened onto the configured opaque dark
/// background before any feature is computed.
pub fn template_from_reference(
    label: &str,
    bytes: &[u8],
    config: &RecognizerConfig,
) -> RecognitionResult<Template> {
    let decoded =
        image::load_from_memory(bytes).map_err(|source| RecognitionError::ImageDecodeFailed {
            label: label.to_string(),
            source,
        })?;

    let flat: RgbImage = if decoded.color().has_alpha() {
        composite_on_background(&decoded.to_rgba8(), config.reference_background)
    } else {
        decoded.to_rgb8()
    };
    if flat.width() == 0 || flat.height() == 0 {
        return Err(RecognitionError::ReferenceFetchFailed {
            label: label.to_string(),
            description: "reference image is empty".to_string(),
        });
    }

    Ok(Template::from_image(label, &flat, config.alt_desaturation))
}

/// Fetch and fingerprint every label's reference image concurrently.
///
/// One task per label; all are joined before returning. A failed fetch,
/// decode or even a panicking task only costs that label its template.
pub async fn calibrate_from_references<P>(
    provider: Arc<P>,
    labels: &LabelSet,
    config: &RecognizerConfig,
) -> (Vec<Template>, CalibrationReport)
where
    P: ReferenceImageProvider + 'static,
{
    let mut tasks = JoinSet::new();
    for label in labels.names() {
        let provider = Arc::clone(&provider);
        let label = label.clone();
        let config = config.clone();
        tasks.spawn(async move {
            let result = match provider.fetch(&label).await {
                Ok(bytes) => {
                    let name = label.clone();
                    // Decoding and feature extraction run on the blocking pool
                    tokio::task::spawn_blocking(move || {
                        template_from_reference(&name, &bytes, &config)
                    })
                    .await
                    .unwrap_or_else(|e| Err(RecognitionError::from(e)))
                }
                Err(description) => Err(RecognitionError::ReferenceFetchFailed {
                    label: label.clone(),
                    description,
                }),
            };
            (label, result)
        });
    }

    let mut pending: HashSet<String> = labels.names().iter().cloned().collect();
    let mut templates = Vec::new();
    let mut failed = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((label, Ok(template))) => {
                log::debug!("Reference template ready for '{}'", label);
                pending.remove(&label);
                templates.push(template);
            }
            Ok((label, Err(e))) => {
                log::warn!("⚠️ Reference calibration failed for '{}': {}", label, e);
                pending.remove(&label);
                failed.push((label, e.to_string()));
            }
            Err(e) => {
                log::error!("Reference calibration task failed: {}", e);
            }
        }
    }
    for label in pending {
        failed.push((label, "calibration task did not complete".to_string()));
    }

    templates.sort_by_key(|t| labels.index_of(&t.label));
    failed.sort_by_key(|(label, _)| labels.index_of(label));

    let report = CalibrationReport {
        calibrated: templates.iter().map(|t| t.label.clone()).collect(),
        failed,
    };
    log::info!(
        "Reference calibration: {} of {} labels calibrated",
        report.calibrated.len(),
        labels.names().len()
    );
    (templates, report)
}

/// Label live slot crops with a vision provider and turn each accepted crop
/// into its label's template.
///
/// `crops` holds (slot, crop) pairs in slot order, primary slots before the
/// preview slot. Answers outside the label set are discarded. When a label is
/// named for several slots only its first slot is used, so a better crop is
/// never overwritten by a worse one.
pub async fn calibrate_from_vision<V>(
    labeler: &V,
    crops: Vec<(usize, RgbImage)>,
    labels: &LabelSet,
    config: &RecognizerConfig,
) -> RecognitionResult<(Vec<Template>, CalibrationReport)>
where
    V: VisionLabeler,
{
    if crops.is_empty() {
        return Err(RecognitionError::NoCropsAvailable);
    }

    let images: Vec<RgbImage> = crops.iter().map(|(_, crop)| crop.clone()).collect();
    let answers = labeler
        .label(&images, labels.names())
        .await
        .map_err(|description| RecognitionError::VisionRequestFailed { description })?;

    let crop_count = crops.len();
    if answers.len() != crop_count {
        log::warn!(
            "Vision provider returned {} answers for {} crops; unmatched slots are skipped",
            answers.len(),
            crop_count
        );
    }

    let mut claimed: HashSet<String> = HashSet::new();
    let mut accepted: Vec<(String, RgbImage)> = Vec::new();
    let mut report = CalibrationReport::default();

    for (index, (slot, crop)) in crops.into_iter().enumerate() {
        let subject = format!("slot {}", slot);
        let Some(answer) = answers.get(index) else {
            report.failed.push((subject, "no answer".to_string()));
            continue;
        };
        let Some(label) = labels.resolve(answer) else {
            log::warn!("Discarding vision answer '{}' for slot {}: not a known label", answer, slot);
            report
                .failed
                .push((subject, format!("answer '{}' is not a known label", answer)));
            continue;
        };
        if !claimed.insert(label.to_string()) {
            log::debug!("'{}' already taken by an earlier slot; ignoring slot {}", label, slot);
            report
                .failed
                .push((subject, format!("duplicate answer '{}'", label)));
            continue;
        }

        accepted.push((label.to_string(), crop));
        report.calibrated.push(label.to_string());
    }

    let alt_desaturation = config.alt_desaturation;
    let templates = tokio::task::spawn_blocking(move || {
        accepted
            .iter()
            .map(|(label, crop)| Template::from_image(label.as_str(), crop, alt_desaturation))
            .collect::<Vec<_>>()
    })
    .await?;

    report.calibrated.sort_by_key(|l| labels.index_of(l));
    log::info!(
        "Vision calibration: {} templates from {} crops",
        templates.len(),
        crop_count
    );
    Ok((templates, report))
}
