//! Audio output trait and error type.

use mp_engine::Frame;

/// Error type for audio output.
///
/// Callers only ever react to two failure surfaces: getting a usable
/// device, and keeping a stream alive on it. Everything the backend
/// reports folds into one of the two.
#[derive(Debug)]
pub enum AudioError {
    /// No usable output device or device configuration
    Device(String),
    /// The stream could not be created, started or stopped
    Stream(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::Device(msg) => write!(f, "audio device unavailable: {}", msg),
            AudioError::Stream(msg) => write!(f, "audio stream error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {}

/// Sink for rendered stereo frames.
pub trait AudioOutput {
    /// Sample rate the player should render at.
    fn sample_rate(&self) -> u32;

    /// Queue frames for the device, blocking until all are accepted.
    fn write(&mut self, frames: &[Frame]);

    /// Start playback.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Stop playback.
    fn stop(&mut self) -> Result<(), AudioError>;
}
