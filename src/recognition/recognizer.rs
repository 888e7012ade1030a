//! Owned recognizer handle
//!
//! A [`Recognizer`] owns its template store, its published state and at most
//! one scan loop. Independent instances share nothing.

use super::calibration::{self, CalibrationReport};
use super::config::RecognizerConfig;
use super::error::{RecognitionError, RecognitionResult};
use super::features::SlotFeatures;
use super::labels::LabelSet;
use super::matcher::SlotMatcher;
use super::persistence::{self, LoadReport};
use super::scanner::ScanHandle;
use super::sources::{FrameSource, ReferenceImageProvider, VisionLabeler};
use super::state::RecognitionState;
use super::template::{Template, TemplateStore};
use super::types::{RecognitionEvent, ScannerState};
use image::RgbImage;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{RwLock, mpsc, watch};

/// State shared between the handle and its scan loop
pub(crate) struct RecognizerCore {
    config: RecognizerConfig,
    matcher: SlotMatcher,
    store: RwLock<TemplateStore>,
    state_tx: watch::Sender<Arc<RecognitionState>>,
    events: Option<mpsc::Sender<RecognitionEvent>>,
    // Bumped on every stop so a loop that is mid-scan cannot publish
    // after the state was cleared.
    generation: AtomicU64,
}

impl RecognizerCore {
    pub(crate) fn config(&self) -> RecognizerConfig {
        self.config.clone()
    }

    pub(crate) fn emit(&self, event: RecognitionEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(event)
        {
            log::debug!("Recognition event dropped: {}", e);
        }
    }

    /// Replace the published state if it differs from the current one.
    /// `generation` of `None` publishes unconditionally.
    fn publish(&self, generation: Option<u64>, state: RecognitionState) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            let stale = generation.is_some_and(|g| g != self.generation.load(Ordering::SeqCst));
            if stale || **current == state {
                return false;
            }
            *current = Arc::new(state);
            true
        });
        if changed {
            let snapshot = self.state_tx.borrow().clone();
            log::info!("🃏 Hand changed: {}", snapshot);
            self.emit(RecognitionEvent::StateChanged(snapshot));
        }
        changed
    }

    /// Crop and featurize every slot on the blocking pool. `None` if the
    /// worker died; the cycle is then skipped.
    async fn extract_slots(&self, frame: RgbImage) -> Option<Vec<(usize, SlotFeatures)>> {
        let layout = self.config.layout.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            layout
                .crop_all(&frame)
                .into_iter()
                .filter_map(|(slot, crop)| match crop {
                    Ok(crop) => Some((slot, SlotFeatures::extract(&crop))),
                    Err(e) => {
                        log::debug!("Skipping slot {} this cycle: {}", slot, e);
                        None
                    }
                })
                .collect::<Vec<_>>()
        })
        .await;

        match extracted {
            Ok(crops) => Some(crops),
            Err(e) => {
                log::error!("Feature extraction task failed: {}", e);
                None
            }
        }
    }

    /// Run the matcher over one frame and publish the result.
    ///
    /// The store read guard is held from the template snapshot through the
    /// publish, so a concurrent `clear` or label change always publishes
    /// after any state computed from the old templates.
    pub(crate) async fn scan_frame(
        &self,
        generation: u64,
        frame: RgbImage,
    ) -> Arc<RecognitionState> {
        if let Some(crops) = self.extract_slots(frame).await {
            let store = self.store.read().await;
            let state = self.matcher.recognize(&crops, &store.templates());
            self.publish(Some(generation), state);
        }
        self.state_tx.borrow().clone()
    }

    async fn templates_updated(&self) {
        let labels = self.store.read().await.calibrated_labels();
        self.emit(RecognitionEvent::TemplatesUpdated(labels));
    }
}

/// Recognition engine handle
pub struct Recognizer {
    core: Arc<RecognizerCore>,
    scan: Mutex<Option<ScanHandle>>,
}

impl Recognizer {
    pub fn new(config: RecognizerConfig) -> RecognitionResult<Self> {
        config.validate()?;
        let (state_tx, _) = watch::channel(Arc::new(RecognitionState::empty()));
        Ok(Self {
            core: Arc::new(RecognizerCore {
                matcher: SlotMatcher::new(&config),
                config,
                store: RwLock::new(TemplateStore::new()),
                state_tx,
                events: None,
                generation: AtomicU64::new(0),
            }),
            scan: Mutex::new(None),
        })
    }

    pub fn with_labels(config: RecognizerConfig, labels: LabelSet) -> RecognitionResult<Self> {
        let mut recognizer = Self::new(config)?;
        if let Some(core) = Arc::get_mut(&mut recognizer.core) {
            core.store.get_mut().set_labels(labels);
        }
        Ok(recognizer)
    }

    /// Publish events to `tx`. Must be called before the first scan.
    pub fn with_event_sender(mut self, tx: mpsc::Sender<RecognitionEvent>) -> Self {
        match Arc::get_mut(&mut self.core) {
            Some(core) => core.events = Some(tx),
            None => log::warn!("Event sender ignored: recognizer core already shared"),
        }
        self
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.core.config
    }

    // ============================================================
    // LABELS AND TEMPLATE STORE
    // ============================================================

    /// Activate a label set. A different set invalidates every template and
    /// the current state. Returns true when the set changed.
    pub async fn set_labels<I, S>(&self, names: I) -> RecognitionResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = LabelSet::new(names)?;
        let changed = {
            let mut store = self.core.store.write().await;
            let changed = store.set_labels(labels);
            if changed {
                self.core.publish(None, RecognitionState::empty());
            }
            changed
        };
        if changed {
            log::info!("Label set changed; templates cleared");
            self.core.templates_updated().await;
        }
        Ok(changed)
    }

    pub async fn labels(&self) -> Option<LabelSet> {
        self.core.store.read().await.labels().cloned()
    }

    async fn require_labels(&self) -> RecognitionResult<LabelSet> {
        self.labels()
            .await
            .ok_or_else(|| RecognitionError::InvalidLabelSet {
                expected: super::labels::LABEL_COUNT,
                description: "no label set is active".to_string(),
            })
    }

    /// Store a template for its label, replacing any earlier one
    pub async fn calibrated(&self, template: Template) -> RecognitionResult<()> {
        let label = template.label.clone();
        if !self.core.store.write().await.calibrated(template) {
            return Err(RecognitionError::UnknownLabel { label });
        }
        self.core.templates_updated().await;
        Ok(())
    }

    pub async fn remove_template(&self, label: &str) -> bool {
        let removed = self.core.store.write().await.remove(label);
        if removed {
            self.core.templates_updated().await;
        }
        removed
    }

    /// Wipe every template and the published state
    pub async fn clear(&self) {
        {
            let mut store = self.core.store.write().await;
            store.clear();
            self.core.publish(None, RecognitionState::empty());
        }
        self.core.templates_updated().await;
        log::info!("Templates cleared");
    }

    pub async fn is_calibrated(&self) -> bool {
        self.core
            .store
            .read()
            .await
            .is_calibrated(self.core.config.min_calibrated_labels)
    }

    pub async fn template_count(&self) -> usize {
        self.core.store.read().await.count()
    }

    pub async fn calibrated_labels(&self) -> Vec<String> {
        self.core.store.read().await.calibrated_labels()
    }

    pub async fn template(&self, label: &str) -> Option<Arc<Template>> {
        self.core.store.read().await.get(label)
    }

    /// Write results into the store unless the label set changed meanwhile
    async fn store_calibration(
        &self,
        labels: &LabelSet,
        templates: Vec<Template>,
        mut report: CalibrationReport,
    ) -> CalibrationReport {
        {
            let mut store = self.core.store.write().await;
            if !store.labels().is_some_and(|active| active.same_as(labels)) {
                log::warn!("Label set changed during calibration; discarding results");
                report.failed.extend(
                    report
                        .calibrated
                        .drain(..)
                        .map(|l| (l, "label set changed during calibration".to_string())),
                );
                return report;
            }
            for template in templates {
                store.calibrated(template);
            }
        }
        self.core.templates_updated().await;
        report
    }

    // ============================================================
    // CALIBRATION
    // ============================================================

    /// Calibrate every label from its reference image
    pub async fn calibrate_from_references<P>(
        &self,
        provider: Arc<P>,
    ) -> RecognitionResult<CalibrationReport>
    where
        P: ReferenceImageProvider + 'static,
    {
        let labels = self.require_labels().await?;
        let (templates, report) =
            calibration::calibrate_from_references(provider, &labels, &self.core.config).await;
        Ok(self.store_calibration(&labels, templates, report).await)
    }

    /// Calibrate from the live slots of `frame` labeled by a vision provider
    pub async fn calibrate_from_vision<V>(
        &self,
        labeler: &V,
        frame: &RgbImage,
    ) -> RecognitionResult<CalibrationReport>
    where
        V: VisionLabeler,
    {
        let labels = self.require_labels().await?;
        let crops: Vec<(usize, RgbImage)> = self
            .core
            .config
            .layout
            .crop_all(frame)
            .into_iter()
            .filter_map(|(slot, crop)| match crop {
                Ok(crop) => Some((slot, crop)),
                Err(e) => {
                    log::warn!("Slot {} unavailable for calibration: {}", slot, e);
                    None
                }
            })
            .collect();

        match calibration::calibrate_from_vision(labeler, crops, &labels, &self.core.config).await {
            Ok((templates, report)) => Ok(self.store_calibration(&labels, templates, report).await),
            Err(e) => {
                if e.is_transient() {
                    log::warn!("Vision calibration failed, retry later: {}", e);
                } else {
                    log::error!("Vision calibration failed: {}", e);
                }
                self.core.emit(RecognitionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    // ============================================================
    // PERSISTENCE
    // ============================================================

    pub async fn save_templates(&self, dir: &Path) -> RecognitionResult<usize> {
        let templates: Vec<Template> = self
            .core
            .store
            .read()
            .await
            .templates()
            .iter()
            .map(|t| t.as_ref().clone())
            .collect();
        let written = persistence::save_templates(dir, &templates).await?;
        log::info!("💾 Saved {} templates to {:?}", written, dir);
        Ok(written)
    }

    /// Load records from `dir` into the store. Records for labels outside the
    /// active set are skipped like corrupt ones.
    pub async fn load_templates(&self, dir: &Path) -> RecognitionResult<LoadReport> {
        let mut report = persistence::load_templates(dir).await?;
        {
            let mut store = self.core.store.write().await;
            let (known, unknown): (Vec<_>, Vec<_>) = report
                .templates
                .drain(..)
                .partition(|t| store.labels().is_some_and(|l| l.contains(&t.label)));
            for template in unknown {
                log::warn!("Skipping stored template '{}': not an active label", template.label);
                report.skipped.push((
                    persistence::record_path(dir, &template.label),
                    format!("label '{}' is not active", template.label),
                ));
            }
            for template in known {
                report.templates.push(template.clone());
                store.calibrated(template);
            }
        }
        self.core.templates_updated().await;
        Ok(report)
    }

    // ============================================================
    // RECOGNITION STATE
    // ============================================================

    /// Latest published snapshot
    pub fn current_state(&self) -> Arc<RecognitionState> {
        self.core.state_tx.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<RecognitionState>> {
        self.core.state_tx.subscribe()
    }

    /// Primary slot currently holding `label`
    pub fn slot_of(&self, label: &str) -> Option<usize> {
        self.current_state().slot_of(label)
    }

    pub fn preview_label(&self) -> Option<String> {
        self.current_state().preview_label().map(str::to_string)
    }

    /// Match one frame outside the scan loop and publish the result
    pub async fn scan_once(&self, frame: &RgbImage) -> Arc<RecognitionState> {
        let generation = self.core.generation.load(Ordering::SeqCst);
        self.core.scan_frame(generation, frame.clone()).await
    }

    // ============================================================
    // SCANNER
    // ============================================================

    /// Start the scan loop. Refused unless enough labels are calibrated;
    /// a second start while scanning is a no-op.
    pub async fn start<S>(&self, source: Arc<S>) -> RecognitionResult<()>
    where
        S: FrameSource + 'static,
    {
        let count = self.template_count().await;
        let required = self.core.config.min_calibrated_labels;
        if count < required {
            log::warn!("Scan start refused: {} of {} templates", count, required);
            return Err(RecognitionError::NotCalibrated { count, required });
        }

        let Ok(mut scan) = self.scan.lock() else {
            return Err(RecognitionError::ScannerLockPoisoned);
        };
        if scan.as_ref().is_some_and(ScanHandle::is_running) {
            log::debug!("Scan loop already running, ignoring start");
            return Ok(());
        }

        let generation = self.core.generation.load(Ordering::SeqCst);
        *scan = Some(ScanHandle::spawn(Arc::clone(&self.core), source, generation));
        self.core
            .emit(RecognitionEvent::ScannerStateChanged(ScannerState::Scanning));
        Ok(())
    }

    /// Stop the scan loop and clear the published state. Returns immediately;
    /// calling it while idle only clears the state.
    pub fn stop(&self) {
        let handle = self.scan.lock().ok().and_then(|mut scan| scan.take());
        self.core.generation.fetch_add(1, Ordering::SeqCst);
        self.core.publish(None, RecognitionState::empty());

        if let Some(handle) = handle {
            handle.cancel();
            self.core
                .emit(RecognitionEvent::ScannerStateChanged(ScannerState::Idle));
            log::info!("⏹️ Scanning stopped");
        }
    }

    pub fn scanner_state(&self) -> ScannerState {
        let running = self
            .scan
            .lock()
            .map(|scan| scan.as_ref().is_some_and(ScanHandle::is_running))
            .unwrap_or(false);
        if running {
            ScannerState::Scanning
        } else {
            ScannerState::Idle
        }
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        if let Ok(mut scan) = self.scan.lock()
            && let Some(handle) = scan.take()
        {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::sources::StaticFrameSource;
    use image::Rgb;

    #[tokio::test]
    async fn test_start_reports_poisoned_scanner_lock() {
        let names = ["A", "B", "C", "D", "E", "F", "G", "H"];
        let labels = LabelSet::new(names).unwrap();
        let recognizer =
            Arc::new(Recognizer::with_labels(RecognizerConfig::default(), labels).unwrap());
        for (i, name) in names.iter().enumerate() {
            let crop = RgbImage::from_pixel(8, 8, Rgb([i as u8 * 30, 100, 200]));
            recognizer
                .calibrated(Template::from_image(*name, &crop, 0.6))
                .await
                .unwrap();
        }

        let holder = Arc::clone(&recognizer);
        let poisoned = std::thread::spawn(move || {
            let _guard = holder.scan.lock().unwrap();
            panic!("scanner lock holder failed");
        })
        .join();
        assert!(poisoned.is_err());

        let result = recognizer.start(Arc::new(StaticFrameSource::new())).await;
        assert!(matches!(result, Err(RecognitionError::ScannerLockPoisoned)));
        assert_eq!(recognizer.scanner_state(), ScannerState::Idle);
    }
}
