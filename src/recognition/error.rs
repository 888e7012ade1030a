use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for recognition operations.
pub type RecognitionResult<T> = Result<T, RecognitionError>;

/// The error type for every recognition, calibration and persistence operation.
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("Slot {slot} region is out of bounds for a {frame_width}x{frame_height} frame")]
    OutOfBounds {
        slot: usize,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("Slot index {slot} is not a defined slot (expected 0..{max})")]
    InvalidSlot { slot: usize, max: usize },

    #[error("Label set must contain exactly {expected} unique names: {description}")]
    InvalidLabelSet { expected: usize, description: String },

    #[error("Label '{label}' is not part of the active label set")]
    UnknownLabel { label: String },

    #[error("Reference image fetch failed for '{label}': {description}")]
    ReferenceFetchFailed { label: String, description: String },

    #[error("Failed to decode image for '{label}': {source}")]
    ImageDecodeFailed {
        label: String,
        source: image::ImageError,
    },

    #[error("Vision labeling request failed: {description}")]
    VisionRequestFailed { description: String },

    #[error("No slot crops could be extracted from the frame")]
    NoCropsAvailable,

    #[error("Recognizer is not calibrated ({count} of {required} labels have templates)")]
    NotCalibrated { count: usize, required: usize },

    #[error("Template record {path:?} is corrupt: {description}")]
    CorruptRecord { path: PathBuf, description: String },

    #[error("Invalid configuration: {description}")]
    InvalidConfig { description: String },

    #[error("Failed to parse configuration {path:?}: {source}")]
    ConfigParseFailed {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {source}")]
    ConfigSerializeFailed {
        #[from]
        source: toml::ser::Error,
    },

    #[error("Scanner handle lock poisoned")]
    ScannerLockPoisoned,

    #[error("Task failed to complete: {source}")]
    JoinError {
        #[from]
        source: tokio::task::JoinError,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl RecognitionError {
    /// Errors scoped to one slot, label or request that a later attempt may not hit
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RecognitionError::OutOfBounds { .. }
                | RecognitionError::ReferenceFetchFailed { .. }
                | RecognitionError::VisionRequestFailed { .. }
        )
    }
}
