//! Headless controller for the modplay player.
//!
//! Provides a unified API for loading modules, real-time playback and
//! offline rendering that CLI front-ends can share.

mod reverb;
mod wav;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use mp_audio::{AudioOutput, CpalOutput};
use mp_engine::Player;

// Re-export common types so callers don't need the member crates directly.
pub use mp_engine::{Frame, PlayerError, PlayerState};
pub use mp_formats::FormatError;
pub use mp_ir::Song;
pub use reverb::{Reverb, ReverbPreset};
pub use wav::{frames_to_wav, write_wav};

/// Frames rendered per chunk on the playback thread and in offline
/// rendering.
const CHUNK_FRAMES: usize = 1024;

/// Playback position reported by a running controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub order: u16,
    pub pattern: u16,
    pub row: u16,
}

fn pack_position(state: &PlayerState) -> u64 {
    (state.order as u64) << 32 | (state.pattern as u64) << 16 | state.row as u64
}

fn unpack_position(packed: u64) -> Position {
    Position {
        order: (packed >> 32) as u16,
        pattern: (packed >> 16) as u16,
        row: packed as u16,
    }
}

/// Headless player controller — owns a song and manages playback.
pub struct Controller {
    song: Option<Arc<Song>>,
    volume_boost: i32,
    start_order: i32,
    reverb: ReverbPreset,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new() -> Self {
        Self {
            song: None,
            volume_boost: 1,
            start_order: 0,
            reverb: ReverbPreset::None,
            playback: None,
        }
    }

    // --- Song management ---

    pub fn song(&self) -> Option<&Song> {
        self.song.as_deref()
    }

    /// Load a MOD or S3M module from a byte buffer.
    pub fn load(&mut self, data: &[u8]) -> Result<(), FormatError> {
        self.stop();
        self.song = Some(Arc::new(mp_formats::load_module(data)?));
        Ok(())
    }

    // --- Playback configuration ---

    pub fn set_volume_boost(&mut self, boost: i32) -> Result<(), PlayerError> {
        if !(1..=4).contains(&boost) {
            return Err(PlayerError::InvalidVolumeBoost);
        }
        self.volume_boost = boost;
        Ok(())
    }

    pub fn set_start_order(&mut self, order: i32) {
        self.start_order = order.max(0);
    }

    pub fn set_reverb(&mut self, preset: ReverbPreset) {
        self.reverb = preset;
    }

    // --- Real-time playback ---

    pub fn play(&mut self) {
        self.stop();
        let Some(song) = self.song.clone() else {
            return;
        };

        let stop_signal = Arc::new(AtomicBool::new(false));
        let position = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let pos = position.clone();
        let done = finished.clone();
        let boost = self.volume_boost;
        let start_order = self.start_order;
        let preset = self.reverb;

        let thread = std::thread::spawn(move || {
            audio_thread(song, boost, start_order, preset, stop, pos, done);
        });

        self.playback = Some(PlaybackHandle {
            stop_signal,
            position,
            finished,
            thread: Some(thread),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = playback.thread.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    pub fn position(&self) -> Option<Position> {
        let playback = self.playback.as_ref()?;
        if playback.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(unpack_position(playback.position.load(Ordering::Relaxed)))
    }

    // --- Offline rendering ---

    /// Render up to `max_frames` at a fixed rate, honoring boost, start
    /// order and reverb settings.
    pub fn render_frames(&self, sample_rate: u32, max_frames: usize) -> Vec<Frame> {
        let Some(song) = self.song.clone() else {
            return Vec::new();
        };

        let mut player = Player::new(song, sample_rate);
        let _ = player.set_volume_boost(self.volume_boost);
        if self.start_order > 0 {
            player.seek_to(self.start_order, 0);
        }
        let mut reverb = match self.reverb {
            ReverbPreset::None => None,
            preset => Some(Reverb::new(preset, sample_rate)),
        };

        let mut frames = Vec::with_capacity(max_frames.min(sample_rate as usize * 60));
        let mut pcm = vec![0i16; CHUNK_FRAMES * 2];
        while player.is_playing() && frames.len() < max_frames {
            let want = CHUNK_FRAMES.min(max_frames - frames.len());
            let got = player.generate_audio(&mut pcm[..want * 2]);
            if got == 0 {
                break;
            }
            let samples = apply_reverb(&mut reverb, &mut pcm[..got * 2]);
            frames.extend(pcm[..samples].chunks_exact(2).map(|pair| Frame {
                left: pair[0],
                right: pair[1],
            }));
        }
        frames
    }

    /// Render the song to an in-memory WAV image, capped at `max_seconds`.
    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(sample_rate, max_frames);
        frames_to_wav(&frames, sample_rate)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run the processed samples through the reverb, in place.
fn apply_reverb(reverb: &mut Option<Reverb>, pcm: &mut [i16]) -> usize {
    match reverb {
        Some(reverb) => {
            reverb.input_samples(pcm);
            reverb.get_audio(pcm)
        }
        None => pcm.len(),
    }
}

fn audio_thread(
    song: Arc<Song>,
    boost: i32,
    start_order: i32,
    preset: ReverbPreset,
    stop_signal: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
) {
    let Ok((mut output, consumer)) = CpalOutput::new() else {
        finished.store(true, Ordering::Relaxed);
        return;
    };

    let sample_rate = output.sample_rate();
    let mut player = Player::new(song, sample_rate);
    let _ = player.set_volume_boost(boost);
    if start_order > 0 {
        player.seek_to(start_order, 0);
    }
    let mut reverb = match preset {
        ReverbPreset::None => None,
        preset => Some(Reverb::new(preset, sample_rate)),
    };

    if output.build_stream(consumer).is_err() || output.start().is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }

    let mut pcm = vec![0i16; CHUNK_FRAMES * 2];
    let mut frames = vec![Frame::silence(); CHUNK_FRAMES];

    while player.is_playing() && !stop_signal.load(Ordering::Relaxed) {
        let got = player.generate_audio(&mut pcm);
        if got == 0 {
            break;
        }
        let samples = apply_reverb(&mut reverb, &mut pcm[..got * 2]);
        for (frame, pair) in frames.iter_mut().zip(pcm[..samples].chunks_exact(2)) {
            frame.left = pair[0];
            frame.right = pair[1];
        }
        output.write(&frames[..samples / 2]);
        position.store(pack_position(&player.state()), Ordering::Relaxed);
    }

    // Let the ring drain before tearing the stream down.
    let silence = vec![Frame::silence(); sample_rate as usize / 5];
    output.write(&silence);
    let _ = output.stop();

    finished.store(true, Ordering::Relaxed);
}
