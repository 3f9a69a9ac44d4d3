//! Song feature analysis — scans a song to report which features it uses.

use alloc::collections::BTreeSet;
use core::fmt;

use crate::effects::Effect;
use crate::pattern::{KEY_OFF, NO_NOTE, NO_VOLUME};
use crate::song::Song;

/// Summary of features used in a song.
pub struct SongFeatures {
    pub effects: BTreeSet<&'static str>,
    pub has_key_off: bool,
    pub note_range: Option<(u8, u8)>,
    pub samples_used: BTreeSet<u8>,
    pub samples_with_loops: usize,
    pub total_notes: usize,
}

/// Analyze a song and return a summary of which features it uses.
pub fn analyze(song: &Song) -> SongFeatures {
    let mut features = SongFeatures {
        effects: BTreeSet::new(),
        has_key_off: false,
        note_range: None,
        samples_used: BTreeSet::new(),
        samples_with_loops: song.samples.iter().filter(|s| s.has_loop()).count(),
        total_notes: 0,
    };

    for pattern in &song.patterns {
        for cell in &pattern.data {
            match cell.pitch {
                NO_NOTE => {}
                KEY_OFF => features.has_key_off = true,
                n => {
                    features.total_notes += 1;
                    features.note_range = Some(match features.note_range {
                        Some((lo, hi)) => (lo.min(n), hi.max(n)),
                        None => (n, n),
                    });
                }
            }

            if cell.sample > 0 {
                features.samples_used.insert(cell.sample);
            }
            if cell.effect != Effect::None {
                features.effects.insert(cell.effect.name());
            }
            if cell.volume != NO_VOLUME {
                features.effects.insert("VolumeColumn");
            }
        }
    }

    features
}

impl fmt::Display for SongFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Notes:    {} total", self.total_notes)?;
        if let Some((lo, hi)) = self.note_range {
            writeln!(f, "Range:    {} - {} (player notes)", lo, hi)?;
        }
        if self.has_key_off {
            writeln!(f, "Key-off:  yes")?;
        }
        writeln!(f, "Loops:    {} samples", self.samples_with_loops)?;
        write!(f, "Effects: ")?;
        if self.effects.is_empty() {
            writeln!(f, " none")?;
        } else {
            for name in &self.effects {
                write!(f, " {}", name)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
