//! Playback engine for the modplay player.
//!
//! Reproduces the tracker's tick-based sequencer and per-channel sample
//! mixer, producing interleaved 16-bit stereo PCM through the pull-style
//! [`Player::generate_audio`].

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod frame;
mod mixer;
mod player;

pub use channel::{ChannelState, Oscillator};
pub use frame::Frame;
pub use player::{ChannelSnapshot, Player, PlayerError, PlayerState, MAX_GENERATE_FRAMES};
