//! Module loaders and the WAV writer for the modplay player.
//!
//! Parses ProTracker MOD and Scream Tracker 3 files from memory buffers
//! into the `mp-ir` song model, and writes interleaved stereo PCM frames
//! as RIFF WAVE.

mod mod_format;
mod s3m_format;
mod wav_format;

pub use mod_format::load_mod;
pub use s3m_format::load_s3m;
pub use wav_format::{frames_to_wav, write_wav};

use core::fmt;

use mp_ir::Song;

/// Error type for module parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatError {
    /// Buffer ended before a required field
    ShortInput,
    /// MOD tag or S3M magic mismatch
    UnrecognizedFormat,
    /// Instrument type or sample format this player does not handle
    UnsupportedSample,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::ShortInput => write!(f, "file truncated"),
            FormatError::UnrecognizedFormat => write!(f, "unrecognized module"),
            FormatError::UnsupportedSample => write!(f, "unsupported sample format"),
        }
    }
}

impl std::error::Error for FormatError {}

/// Load a module, picking the parser from the file contents.
pub fn load_module(data: &[u8]) -> Result<Song, FormatError> {
    if data.len() >= 48 && &data[44..48] == b"SCRM" {
        load_s3m(data)
    } else {
        load_mod(data)
    }
}

/// Decode a fixed-width name field: printable ASCII only, trimmed.
pub(crate) fn parse_name(raw: &[u8]) -> String {
    let text: String = raw
        .iter()
        .copied()
        .take_while(|&b| b != 0)
        .map(|b| if (0x20..0x7F).contains(&b) { b as char } else { ' ' })
        .collect();
    text.trim().to_string()
}
