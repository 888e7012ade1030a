// Communication channels for recognition events
use super::types::RecognitionEvent;
use tokio::sync::mpsc;

/// Capacity of the event channel. Events are published with `try_send`, so a
/// slow consumer loses events instead of stalling the scan loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Helper function to create the recognition event channel
pub fn create_recognition_channels() -> (
    mpsc::Sender<RecognitionEvent>,
    mpsc::Receiver<RecognitionEvent>,
) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}
