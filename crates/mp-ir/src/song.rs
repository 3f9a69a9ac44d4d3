//! Song structure.

use alloc::vec;
use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::pattern::Pattern;
use crate::sample::Sample;

/// Order-table entry marking a skipped slot (S3M `+++`).
pub const ORDER_MARKER: u8 = 254;

/// A complete decoded module, immutable once loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct Song {
    /// Song title
    pub title: ArrayString<28>,
    /// Number of score channels (1-32)
    pub channels: u8,
    /// Initial speed (ticks per row)
    pub speed: u8,
    /// Initial tempo (tick rate)
    pub tempo: u8,
    /// Global volume (0-64)
    pub global_volume: u8,
    /// Pattern play order; [`ORDER_MARKER`] entries are skipped in playback
    pub orders: Vec<u8>,
    /// Default pan per channel (0 = left .. 127 = right)
    pub default_pan: Vec<u8>,
    /// Sample table; score cells index it 1-based
    pub samples: Vec<Sample>,
    /// Pattern pool
    pub patterns: Vec<Pattern>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            channels: 4,
            speed: 6,
            tempo: 125,
            global_volume: 64,
            orders: Vec::new(),
            default_pan: vec![0x40; 4],
            samples: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

impl Song {
    /// Create an empty song with a given channel count, panned center.
    pub fn with_channels(title: &str, channels: u8) -> Self {
        let mut song = Self {
            channels,
            default_pan: vec![0x40; channels as usize],
            ..Self::default()
        };
        let _ = song.title.try_push_str(title);
        song
    }

    /// Resolve an order-list position to its pattern, if both exist.
    pub fn pattern_for_order(&self, order: usize) -> Option<&Pattern> {
        let index = *self.orders.get(order)? as usize;
        self.patterns.get(index)
    }
}
