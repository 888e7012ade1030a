pub mod recognition;

pub use recognition::{
    LabelSet, RecognitionError, RecognitionEvent, RecognitionResult, RecognitionState, Recognizer,
    RecognizerConfig,
};
