//! Player-note and period conversions.
//!
//! Internal periods are Amiga-style period units scaled by 4. The float
//! closed forms here run at load and note-trigger time only; the mixer hot
//! loop consumes their integer results.

/// Reference period for player note 0 at the MOD base rate. A ProTracker
/// C-4 cell (file period 428) lands on player note 60.
pub const PERIOD_BASE: u32 = 13696;

/// Clock numerator for the period → Hz conversion in the mixer. Chosen so
/// a sample tuned to `c4_speed` Hz plays back at exactly that rate at note
/// C-4 after the mixer's internal period doubling.
pub const PERIOD_CLOCK: u32 = 8363 * PERIOD_BASE;

/// Lowest internal period (highest pitch).
pub const PERIOD_MIN: i32 = 1;

/// Highest internal period (lowest pitch).
pub const PERIOD_MAX: i32 = 65535;

/// Neutral fine-tune index.
pub const FINETUNE_NEUTRAL: u8 = 8;

/// Period multipliers for fine-tune indices 0..15, scaled by 4096.
/// Each step away from index 8 detunes by 1/8 of a semitone.
const FINETUNE_TABLE: [u32; 16] = [
    4340, 4308, 4277, 4247, 4216, 4186, 4156, 4126, // -8 .. -1
    4096, 4067, 4037, 4008, 3979, 3951, 3922, 3894, //  0 .. +7
];

/// Convert a 12-bit Amiga period from a MOD file to a player note.
///
/// Returns [`crate::NO_NOTE`] for period 0.
pub fn note_for_period(period: u16) -> u8 {
    if period == 0 {
        return 0;
    }
    let note = 12.0 * libm::log2(PERIOD_BASE as f64 / period as f64);
    libm::round(note) as u8
}

/// Compute the internal period for a player note on a sample tuned to
/// `c4_speed` Hz, before any fine-tune adjustment.
///
/// The truncation happens at the Amiga-period level; the result carries the
/// internal x4 scale.
pub fn period_for_note(pitch: u8, c4_speed: u32) -> i32 {
    if pitch == 0 || c4_speed == 0 {
        return 0;
    }
    let base = 8363.0 * (PERIOD_BASE * 4) as f64 / libm::pow(2.0, pitch as f64 / 12.0);
    let amiga = (base / c4_speed as f64) as i32;
    (amiga * 4).clamp(PERIOD_MIN, PERIOD_MAX)
}

/// Scale a period by a fine-tune index from a MOD sample header.
pub fn apply_finetune(period: i32, finetune: u8) -> i32 {
    if finetune == FINETUNE_NEUTRAL {
        return period;
    }
    let mul = FINETUNE_TABLE[(finetune & 0x0F) as usize] as i64;
    ((period as i64 * mul) >> 12) as i32
}
