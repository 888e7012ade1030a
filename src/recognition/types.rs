// Types and enums shared by the recognizer and its consumers
use super::state::RecognitionState;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScannerState {
    Idle,
    Scanning,
}

#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    StateChanged(Arc<RecognitionState>),
    ScannerStateChanged(ScannerState),
    TemplatesUpdated(Vec<String>), // calibrated labels after a store change
    FramesMissing(u32),            // consecutive misses at escalation
    Error(String),
}
