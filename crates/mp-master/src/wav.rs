//! WAV re-exports for controller users.

pub use mp_formats::{frames_to_wav, write_wav};
