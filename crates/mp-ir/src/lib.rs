//! Core song model for the modplay player.
//!
//! Loaders decode module files into these types and the playback engine
//! consumes them. A `Song` is immutable once decoded and may be shared
//! read-only between players.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod analysis;
mod effects;
mod pattern;
mod period;
mod sample;
mod song;

pub use analysis::{analyze, SongFeatures};
pub use effects::{ext, Effect};
pub use pattern::{Note, Pattern, KEY_OFF, NO_NOTE, NO_VOLUME, ROWS_PER_PATTERN};
pub use period::{
    apply_finetune, note_for_period, period_for_note, FINETUNE_NEUTRAL, PERIOD_BASE, PERIOD_CLOCK,
    PERIOD_MAX, PERIOD_MIN,
};
pub use sample::Sample;
pub use song::{Song, ORDER_MARKER};
