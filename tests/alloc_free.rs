//! Allocation-free generate path tests.
//!
//! Verify that `Player::generate_audio` does not allocate during the
//! realtime phase, including across row triggers, jump effects, and the
//! end-of-song reset. Just run `cargo test` — no feature flags needed.

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

use std::sync::Arc;

use mp_engine::Player;
use mp_ir::{Effect, Pattern, Sample, Song};

/// A busy 8-channel song exercising triggers, slides, vibrato, retrig,
/// pattern breaks and a looping sample.
fn busy_song() -> Song {
    let mut song = Song::with_channels("alloc", 8);

    let mut sample = Sample::new("loop");
    sample.data = (0..4000).map(|i| (i % 200) as i8).collect();
    sample.loop_start = 100;
    sample.loop_len = 3000;
    sample.normalize_loop();
    song.samples.push(sample);

    let mut short = Sample::new("short");
    short.data = vec![90i8; 300];
    song.samples.push(short);

    let mut pattern = Pattern::new(8);
    for row in 0..64u16 {
        for ch in 0..8u8 {
            if (row + ch as u16) % 4 == 0 {
                let cell = pattern.cell_mut(row, ch);
                cell.pitch = 48 + (row % 24) as u8;
                cell.sample = 1 + (ch % 2);
                cell.effect = match ch % 5 {
                    0 => Effect::Vibrato,
                    1 => Effect::VolumeSlide,
                    2 => Effect::PortamentoUp,
                    3 => Effect::NoteRetrigVolSlide,
                    _ => Effect::None,
                };
                cell.param = 0x23;
            }
        }
    }
    song.patterns.push(pattern);
    song.orders.extend_from_slice(&[0, 0]);
    song
}

#[test]
fn generate_is_alloc_free() {
    let mut player = Player::new(Arc::new(busy_song()), 44100);
    let mut out = vec![0i16; 1024 * 2];

    assert_no_alloc(|| {
        for _ in 0..(44100 * 5 / 1024) {
            player.generate_audio(&mut out);
        }
    });
}

#[test]
fn song_end_reset_is_alloc_free() {
    let mut player = Player::new(Arc::new(busy_song()), 44100);
    player.set_play_order_limit(1);
    let mut out = vec![0i16; 4096 * 2];

    assert_no_alloc(|| {
        // Run straight through the end-of-song reset and the stopped state.
        for _ in 0..200 {
            player.generate_audio(&mut out);
        }
    });
    assert!(!player.is_playing());
}
