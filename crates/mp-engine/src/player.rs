//! The player: row/tick sequencer and the public playback façade.
//!
//! `generate_audio` alternates between consuming the remaining samples of
//! the current tick into the mix accumulator and advancing the sequencer
//! one tick, until the request is filled or the song ends.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use mp_ir::{
    apply_finetune, ext, period_for_note, Effect, Note, Song, KEY_OFF, NO_NOTE, NO_VOLUME,
    ORDER_MARKER, ROWS_PER_PATTERN,
};

use crate::channel::ChannelState;
use crate::mixer;

/// Capacity of the mix accumulator in stereo frames. `generate_audio`
/// requests beyond it fail.
pub const MAX_GENERATE_FRAMES: usize = 4096;

/// Error type for player configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerError {
    /// Volume boost outside 1..=4
    InvalidVolumeBoost,
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerError::InvalidVolumeBoost => write!(f, "volume boost must be 1-4"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlayerError {}

/// Per-channel pattern-loop bookkeeping (SBx / E6x).
#[derive(Clone, Copy, Debug, Default)]
struct LoopState {
    start_row: i32,
    count: i32,
}

/// Snapshot of the playback position for UI display.
#[derive(Clone, Debug)]
pub struct PlayerState {
    pub order: usize,
    pub pattern: usize,
    pub row: usize,
    pub channels: Vec<ChannelSnapshot>,
}

/// Per-channel slice of a state snapshot.
#[derive(Clone, Copy, Debug)]
pub struct ChannelSnapshot {
    /// The score cell at the snapshot position
    pub note: Note,
    /// Playing sample index, -1 when silent
    pub instrument: i32,
    pub trig_order: i32,
    pub trig_row: i32,
    pub trig_tick: i32,
}

/// Plays a [`Song`], producing interleaved stereo 16-bit PCM on demand.
///
/// Not internally synchronized: drive it from one thread, or serialize
/// externally.
pub struct Player {
    song: Arc<Song>,
    sample_rate: u32,

    channels: Vec<ChannelState>,
    loops: Vec<LoopState>,

    order: i32,
    row: i32,
    tick: u32,
    tick_sample_pos: u32,
    samples_per_tick: u32,

    speed: u32,
    tempo: u32,
    global_volume: i32,

    /// Jump queued during the row scan: (target order or -1 for "next",
    /// target row). Each jump-family effect replaces it, so the last
    /// channel in the scan wins.
    pending_jump: Option<(i32, i32)>,
    /// Pattern-loop rewind queued during the row scan
    loop_jump_row: i32,

    playing: bool,
    mute: u32,
    volume_boost: i32,
    play_order_limit: i32,
    orders_played: i32,

    mix_buffer: Vec<i32>,
}

impl Player {
    /// Create a player for a song; playback starts immediately.
    pub fn new(song: Arc<Song>, sample_rate: u32) -> Self {
        let channels = song
            .default_pan
            .iter()
            .map(|&pan| ChannelState::new(pan))
            .collect::<Vec<_>>();
        let loops = vec![LoopState::default(); channels.len()];

        let mut player = Self {
            song,
            sample_rate,
            channels,
            loops,
            order: 0,
            row: 0,
            tick: 0,
            tick_sample_pos: 0,
            samples_per_tick: 0,
            speed: 6,
            tempo: 125,
            global_volume: 64,
            pending_jump: None,
            loop_jump_row: -1,
            playing: true,
            mute: 0,
            volume_boost: 1,
            play_order_limit: -1,
            orders_played: 0,
            mix_buffer: vec![0; MAX_GENERATE_FRAMES * 2],
        };
        player.reset();
        player
    }

    /// Reinitialize all channel state and positions from the song defaults.
    pub fn reset(&mut self) {
        for (channel, &pan) in self.channels.iter_mut().zip(self.song.default_pan.iter()) {
            *channel = ChannelState::new(pan);
        }
        for state in self.loops.iter_mut() {
            *state = LoopState::default();
        }
        self.order = 0;
        self.row = 0;
        self.tick = 0;
        self.tick_sample_pos = 0;
        self.speed = self.song.speed.max(1) as u32;
        self.tempo = self.song.tempo as u32;
        self.global_volume = self.song.global_volume as i32;
        self.pending_jump = None;
        self.loop_jump_row = -1;
        self.orders_played = 0;
        self.update_samples_per_tick();

        // Skip leading marker orders.
        while (self.order as usize) < self.song.orders.len()
            && self.song.orders[self.order as usize] == ORDER_MARKER
        {
            self.order += 1;
        }
    }

    // --- Configuration ---

    /// Output gain multiplier, 1-4.
    pub fn set_volume_boost(&mut self, boost: i32) -> Result<(), PlayerError> {
        if !(1..=4).contains(&boost) {
            return Err(PlayerError::InvalidVolumeBoost);
        }
        self.volume_boost = boost;
        Ok(())
    }

    /// Stop after playing this many orders; -1 disables the limit.
    pub fn set_play_order_limit(&mut self, limit: i32) {
        self.play_order_limit = limit;
    }

    pub fn set_muted(&mut self, channel: usize, muted: bool) {
        if channel < 32 {
            if muted {
                self.mute |= 1 << channel;
            } else {
                self.mute &= !(1 << channel);
            }
        }
    }

    pub fn is_muted(&self, channel: usize) -> bool {
        channel < 32 && self.mute & (1 << channel) != 0
    }

    // --- Transport ---

    pub fn start(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Jump to a position; the next generate call re-enters the row.
    pub fn seek_to(&mut self, order: i32, row: i32) {
        let last_order = self.song.orders.len() as i32 - 1;
        self.order = order.clamp(0, last_order.max(0));
        self.row = row.clamp(0, ROWS_PER_PATTERN as i32 - 1);
        self.tick = 0;
        self.tick_sample_pos = 0;
        self.pending_jump = None;
        self.loop_jump_row = -1;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    // --- Queries ---

    /// Snapshot of the current position and per-channel note data. The row
    /// briefly parks below zero around jump effects; it is clamped here.
    pub fn state(&self) -> PlayerState {
        let last_order = self.song.orders.len().saturating_sub(1);
        let order = (self.order.max(0) as usize).min(last_order);
        let row = self.row.clamp(0, ROWS_PER_PATTERN as i32 - 1) as usize;
        let pattern = self.song.orders.get(order).copied().unwrap_or(0) as usize;
        let cells = self.song.patterns.get(pattern);

        let channels = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| ChannelSnapshot {
                note: cells
                    .filter(|p| (i as u8) < p.channels)
                    .map(|p| *p.cell(row as u16, i as u8))
                    .unwrap_or_default(),
                instrument: channel.sample,
                trig_order: channel.trig_order,
                trig_row: channel.trig_row.max(0),
                trig_tick: channel.trig_tick,
            })
            .collect();

        PlayerState {
            order,
            pattern,
            row,
            channels,
        }
    }

    /// Read-only access to the note data of a pattern row.
    pub fn note_data_for(&self, order: usize, row: usize) -> Option<&[Note]> {
        if row >= ROWS_PER_PATTERN as usize {
            return None;
        }
        Some(self.song.pattern_for_order(order)?.row(row as u16))
    }

    // --- Audio generation ---

    /// Fill `out` (interleaved stereo) with up to `out.len() / 2` frames,
    /// advancing the song. Returns the number of frames written: 0 when
    /// stopped or when the request exceeds the mix buffer capacity, and
    /// possibly fewer than requested when the song ends mid-call.
    pub fn generate_audio(&mut self, out: &mut [i16]) -> usize {
        #[cfg(feature = "alloc_check")]
        {
            assert_no_alloc::assert_no_alloc(|| self.generate_audio_inner(out))
        }
        #[cfg(not(feature = "alloc_check"))]
        {
            self.generate_audio_inner(out)
        }
    }

    fn generate_audio_inner(&mut self, out: &mut [i16]) -> usize {
        if !self.playing {
            return 0;
        }
        let frames = out.len() / 2;
        if frames > MAX_GENERATE_FRAMES {
            return 0;
        }

        self.mix_buffer[..frames * 2].fill(0);

        let mut filled = 0usize;
        while filled < frames && self.playing {
            if self.tick_sample_pos == 0 {
                self.sequence_tick();
                if !self.playing {
                    break;
                }
            }

            let remaining = self.samples_per_tick.saturating_sub(self.tick_sample_pos) as usize;
            let batch = remaining.min(frames - filled);
            self.mix_tick(filled, batch);
            self.tick_sample_pos += batch as u32;
            filled += batch;

            if self.tick_sample_pos >= self.samples_per_tick {
                self.tick_sample_pos = 0;
                self.advance_tick();
            }
        }

        mixer::write_out(&self.mix_buffer[..filled * 2], &mut out[..filled * 2]);
        filled
    }

    /// Mix all channels for `frames` samples at `offset` frames into the
    /// accumulator.
    fn mix_tick(&mut self, offset: usize, frames: usize) {
        let out = &mut self.mix_buffer[offset * 2..(offset + frames) * 2];
        let song = &self.song;
        for (i, channel) in self.channels.iter_mut().enumerate() {
            if self.mute & (1 << i) != 0 {
                continue;
            }
            let Some(sample) = usize::try_from(channel.sample)
                .ok()
                .and_then(|index| song.samples.get(index))
            else {
                continue;
            };
            mixer::mix_channel(
                channel,
                sample,
                self.global_volume,
                self.volume_boost,
                self.sample_rate,
                out,
            );
        }
    }

    // --- Sequencer ---

    fn update_samples_per_tick(&mut self) {
        self.samples_per_tick =
            ((self.sample_rate * 2 + self.sample_rate / 2) / self.tempo.max(1)).max(1);
    }

    /// Tempo changes take effect immediately; a partially consumed tick is
    /// not rewound.
    fn set_tempo(&mut self, tempo: u32) {
        self.tempo = tempo;
        self.update_samples_per_tick();
    }

    fn sequence_tick(&mut self) {
        if self.tick == 0 {
            self.process_row();
        } else {
            self.process_intermediate_tick();
        }
    }

    /// Advance the tick counter, rolling over into row and order advances.
    fn advance_tick(&mut self) {
        self.tick += 1;
        if self.tick >= self.speed {
            self.tick = 0;
            self.row += 1;
            if self.row >= ROWS_PER_PATTERN as i32 {
                self.row = 0;
                self.advance_order_to(self.order + 1);
            }
        }
    }

    /// Move to an order slot, skipping markers. Ends the song when the
    /// order list or the play-order limit runs out.
    fn advance_order_to(&mut self, target: i32) {
        let mut order = target;
        while (order as usize) < self.song.orders.len()
            && self.song.orders[order as usize] == ORDER_MARKER
        {
            order += 1;
        }
        if order as usize >= self.song.orders.len() {
            self.finish();
            return;
        }
        self.order = order;
        self.orders_played += 1;
        if self.play_order_limit >= 0 && self.orders_played >= self.play_order_limit {
            self.finish();
        }
    }

    /// Natural song end: reset to defaults and stop.
    fn finish(&mut self) {
        self.reset();
        self.playing = false;
    }

    /// The row tick: decode and trigger every channel's cell, run the
    /// row-side of its effect, then apply queued jumps.
    fn process_row(&mut self) {
        let mut cells = [Note::empty(); 32];
        let used = self.channels.len().min(32);
        if let Some(pattern) = self.song.pattern_for_order(self.order as usize) {
            for (slot, cell) in cells
                .iter_mut()
                .zip(pattern.row(self.row.max(0) as u16).iter())
                .take(used)
            {
                *slot = *cell;
            }
        }

        self.pending_jump = None;
        self.loop_jump_row = -1;

        for index in 0..used {
            let note = cells[index];
            self.trigger_cell(index, &note);
            self.apply_row_effect(index, &note);
        }

        // End-of-row bookkeeping. The row parks one short of the target so
        // the natural advance lands on it; readers clamp the negative.
        if self.loop_jump_row >= 0 {
            self.row = self.loop_jump_row - 1;
        } else if let Some((order, row)) = self.pending_jump {
            let target = if order >= 0 { order } else { self.order + 1 };
            self.advance_order_to(target);
            self.row = row - 1;
        }
    }

    /// Steps 1-8 of the row-trigger sequence for one channel.
    fn trigger_cell(&mut self, index: usize, note: &Note) {
        let song = Arc::clone(&self.song);
        let (order, row, tick) = (self.order, self.row, self.tick as i32);
        let channel = &mut self.channels[index];

        channel.effect = note.effect;
        channel.param = note.param;
        channel.effect_counter = 0;

        let mut queued_volume = -1i32;

        // Instrument column: queue the sample and its default volume. An
        // instrument change without a note silences the old note outright.
        if note.sample > 0 {
            if let Some(sample) = song.samples.get(note.sample as usize - 1) {
                channel.sample_to_play = note.sample as i32 - 1;
                queued_volume = sample.volume as i32;
                if note.pitch == NO_NOTE && channel.sample_to_play != channel.sample {
                    channel.stop();
                }
            }
        }

        if note.volume != NO_VOLUME {
            queued_volume = note.volume as i32;
        }

        let delayed = note.effect == Effect::Extended
            && note.param >> 4 == ext::NOTE_DELAY
            && note.param & 0x0F != 0;
        let plays_now = !delayed
            && !matches!(
                note.effect,
                Effect::PortaToNote | Effect::PortaToNoteVolSlide
            );

        if note.pitch != NO_NOTE {
            // Any present pitch, the key-off sentinel included, refreshes
            // the period and the tone portamento target.
            let (c4_speed, finetune) = usize::try_from(channel.sample_to_play)
                .ok()
                .and_then(|i| song.samples.get(i))
                .map(|s| (s.c4_speed, s.finetune))
                .unwrap_or((8363, mp_ir::FINETUNE_NEUTRAL));
            let period = apply_finetune(period_for_note(note.pitch, c4_speed), finetune);

            channel.porta_period = period;
            if plays_now {
                if note.pitch == KEY_OFF {
                    channel.volume = 0;
                    queued_volume = -1;
                } else {
                    channel.trigger_note(period, order, row, tick);
                }
            } else if delayed {
                channel.period_to_play = period;
            }
        } else if note.effect == Effect::NoteRetrigVolSlide && note.param == 0 {
            // A bare retrig cell restarts the running note immediately.
            let period = channel.period;
            channel.trigger_note(period, order, row, tick);
            channel.retrig_volume();
        }

        channel.volume_to_play = if queued_volume >= 0 {
            queued_volume
        } else {
            channel.volume
        };
        if queued_volume >= 0 && !delayed {
            channel.volume = queued_volume;
        }

        channel.vibrato.adjust = 0;
        channel.tremolo.adjust = 0;
    }

    /// Step 9: the row-tick side of the cell's effect.
    fn apply_row_effect(&mut self, index: usize, note: &Note) {
        let param = note.param;
        match note.effect {
            Effect::PortaToNote => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.porta_speed = param;
                }
            }
            Effect::PortaToNoteVolSlide | Effect::VolumeSlide => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.vol_slide_memory = param;
                }
            }
            Effect::Vibrato => self.channels[index].vibrato.set_params(param),
            Effect::Tremolo => self.channels[index].tremolo.set_params(param),
            Effect::SetPanPosition => {
                // The stored pan keeps the 0..127 range.
                self.channels[index].pan = param.min(127);
            }
            Effect::SampleOffset => {
                self.channels[index].sample_position = (param as u64) << 24;
            }
            Effect::SetVolume => self.channels[index].volume = param.min(64) as i32,
            Effect::JumpToPattern => {
                let last = self.song.orders.len() as i32 - 1;
                self.pending_jump = Some(((param as i32).min(last.max(0)), 0));
            }
            Effect::PatternBreak => {
                let row = 10 * (param >> 4) as i32 + (param & 0x0F) as i32;
                self.pending_jump = Some((-1, if row > 63 { 0 } else { row }));
            }
            Effect::SetSpeed => {
                if param >= 0x20 {
                    self.set_tempo(param as u32);
                } else if param > 0 {
                    self.speed = param as u32;
                }
            }
            Effect::PatternLoop => self.pattern_loop(index, param & 0x0F),
            Effect::S3MVolumeSlide => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.vol_slide_memory = param;
                }
                let memory = channel.vol_slide_memory;
                let (up, down) = (memory >> 4, memory & 0x0F);
                if up == 0x0F && down > 0 {
                    channel.volume = (channel.volume - down as i32).max(0);
                } else if down == 0x0F && up > 0 {
                    channel.volume = (channel.volume + up as i32).min(64);
                }
            }
            Effect::S3MPortamentoUp => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.porta_memory = param;
                }
                let memory = channel.porta_memory;
                match memory >> 4 {
                    0x0F => channel.slide_period(-4 * (memory & 0x0F) as i32),
                    0x0E => channel.slide_period(-((memory & 0x0F) as i32)),
                    _ => {}
                }
            }
            Effect::S3MPortamentoDown => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.porta_memory = param;
                }
                let memory = channel.porta_memory;
                match memory >> 4 {
                    0x0F => channel.slide_period(4 * (memory & 0x0F) as i32),
                    0x0E => channel.slide_period((memory & 0x0F) as i32),
                    _ => {}
                }
            }
            Effect::S3MGlobalVolume => self.global_volume = param.min(64) as i32,
            Effect::NoteRetrigVolSlide => {
                let channel = &mut self.channels[index];
                if param != 0 {
                    channel.retrig_memory = param;
                }
            }
            Effect::Extended => match param >> 4 {
                ext::VIBRATO_WAVEFORM => self.channels[index].vibrato.waveform = param & 0x0F,
                ext::PATTERN_LOOP => self.pattern_loop(index, param & 0x0F),
                ext::FINE_VOL_SLIDE_UP => {
                    let channel = &mut self.channels[index];
                    channel.volume = (channel.volume + (param & 0x0F) as i32).min(64);
                }
                ext::FINE_VOL_SLIDE_DOWN => {
                    let channel = &mut self.channels[index];
                    channel.volume = (channel.volume - (param & 0x0F) as i32).max(0);
                }
                ext::NOTE_CUT if param & 0x0F == 0 => self.channels[index].volume = 0,
                _ => {}
            },
            _ => {}
        }
    }

    /// SBx / E6x: mark a loop start or count a repeat.
    fn pattern_loop(&mut self, index: usize, count: u8) {
        let state = &mut self.loops[index];
        if count == 0 {
            state.start_row = self.row;
            return;
        }
        if state.count == 0 {
            state.count = count as i32;
        } else {
            state.count -= 1;
        }
        if state.count > 0 {
            self.loop_jump_row = state.start_row;
        }
    }

    /// Intermediate ticks: continuous effect modulation per channel.
    fn process_intermediate_tick(&mut self) {
        let (order, row, tick) = (self.order, self.row.max(0), self.tick as i32);
        for channel in self.channels.iter_mut() {
            channel.effect_counter += 1;
            let param = channel.param;
            match channel.effect {
                Effect::PortamentoUp => channel.slide_period(-4 * param as i32),
                Effect::PortamentoDown => channel.slide_period(4 * param as i32),
                Effect::PortaToNote => channel.step_porta(),
                Effect::PortaToNoteVolSlide => {
                    channel.volume_slide(channel.vol_slide_memory);
                    channel.step_porta();
                }
                Effect::Vibrato => channel.vibrato.step(7),
                Effect::Tremolo => channel.tremolo.step(6),
                Effect::VolumeSlide => channel.volume_slide(channel.vol_slide_memory),
                Effect::S3MVolumeSlide => {
                    let memory = channel.vol_slide_memory;
                    if memory >> 4 != 0x0F && memory & 0x0F != 0x0F {
                        channel.volume_slide(memory);
                    }
                }
                Effect::S3MPortamentoUp => {
                    if channel.porta_memory < 0xE0 {
                        channel.slide_period(-4 * channel.porta_memory as i32);
                    }
                }
                Effect::S3MPortamentoDown => {
                    if channel.porta_memory < 0xE0 {
                        channel.slide_period(4 * channel.porta_memory as i32);
                    }
                }
                Effect::NoteRetrigVolSlide => {
                    let interval = (channel.retrig_memory & 0x0F) as u32;
                    if interval > 0 && channel.effect_counter % interval == 0 {
                        channel.sample_position = 0;
                        channel.sample = channel.sample_to_play;
                        channel.retrig_volume();
                    }
                }
                Effect::Extended => match param >> 4 {
                    ext::NOTE_CUT if channel.effect_counter == (param & 0x0F) as u32 => {
                        channel.volume = 0;
                    }
                    ext::NOTE_DELAY if channel.effect_counter == (param & 0x0F) as u32 => {
                        if channel.period_to_play > 0 {
                            let period = channel.period_to_play;
                            channel.trigger_note(period, order, row, tick);
                            channel.volume = channel.volume_to_play;
                            channel.period_to_play = 0;
                        }
                    }
                    _ => {}
                },
                _ => {}
            }
        }
    }
}
