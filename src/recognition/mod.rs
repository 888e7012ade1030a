// Recognition module
// This module identifies which labeled items occupy the fixed slots of a
// captured frame, using calibrated fingerprint and color templates.

pub mod calibration;
pub mod channels;
pub mod config;
pub mod error;
pub mod features;
pub mod labels;
pub mod matcher;
pub mod persistence;
pub mod recognizer;
pub mod region;
pub mod scanner;
pub mod sources;
pub mod state;
pub mod template;
pub mod types;


// Re-export the main types and functions for easy access
pub use calibration::CalibrationReport;
pub use channels::create_recognition_channels;
pub use config::{RecognizerConfig, create_fast_scan_config, create_strict_config};
pub use error::{RecognitionError, RecognitionResult};
pub use features::SlotFeatures;
pub use labels::{LABEL_COUNT, LabelSet};
pub use matcher::{CandidateMatch, SlotMatcher};
pub use persistence::LoadReport;
pub use recognizer::Recognizer;
pub use region::{PREVIEW_SLOT, PRIMARY_SLOT_COUNT, SLOT_COUNT, SlotLayout, SlotRegion};
pub use sources::{
    DirectoryReferenceProvider, FrameSequenceSource, FrameSource, ReferenceImageProvider,
    StaticFrameSource, VisionLabeler,
};
pub use state::RecognitionState;
pub use template::{Template, TemplateStore};
pub use types::{RecognitionEvent, ScannerState};
