//! Scream Tracker 3 (S3M) parser.

use mp_ir::{Effect, Note, Pattern, Sample, Song, KEY_OFF, NO_NOTE};

use crate::{parse_name, FormatError};

const MAGIC_OFFSET: usize = 44;
const HEADER_LEN: usize = 96;
const INSTRUMENT_HEADER_LEN: usize = 80;

/// Number of trailing bytes to skip for an unmapped channel, indexed by the
/// top three presence bits of the packed byte.
const SKIP_LEN: [usize; 8] = [0, 2, 1, 3, 2, 4, 3, 5];

/// Load a Scream Tracker 3 module from bytes.
pub fn load_s3m(data: &[u8]) -> Result<Song, FormatError> {
    if data.len() < HEADER_LEN {
        return Err(FormatError::ShortInput);
    }
    if &data[MAGIC_OFFSET..MAGIC_OFFSET + 4] != b"SCRM" {
        return Err(FormatError::UnrecognizedFormat);
    }

    let order_count = le16(data, 32) as usize;
    let instrument_count = le16(data, 34) as usize;
    let pattern_count = le16(data, 36) as usize;
    let stereo = data[51] & 0x80 != 0;
    let pan_flag = data[53];

    // Channel settings: values below 16 enable a channel, 255 ends the
    // scan. Enabled channels pack into the contiguous internal index space.
    let mut remap = [None::<u8>; 32];
    let mut left_group = [false; 32];
    let mut channels = 0u8;
    for (i, &setting) in data[64..96].iter().enumerate() {
        if setting == 255 {
            break;
        }
        if setting < 16 {
            remap[i] = Some(channels);
            left_group[channels as usize] = setting < 8;
            channels += 1;
        }
    }
    if channels == 0 {
        return Err(FormatError::UnrecognizedFormat);
    }

    let mut song = Song::with_channels(&parse_name(&data[0..28]), channels);
    song.global_volume = data[48].min(64);
    if data[49] > 0 {
        song.speed = data[49];
    }
    if data[50] > 0 {
        song.tempo = data[50];
    }

    let mut pos = HEADER_LEN;
    if data.len() < pos + order_count + 2 * (instrument_count + pattern_count) {
        return Err(FormatError::ShortInput);
    }

    // Orders: 255 terminates the list; 254 marker entries stay, the
    // sequencer skips over them at playback time.
    for &order in &data[pos..pos + order_count] {
        if order == 255 {
            break;
        }
        song.orders.push(order);
    }
    pos += order_count;

    let instrument_ptrs: Vec<usize> = (0..instrument_count)
        .map(|i| le16(data, pos + 2 * i) as usize * 16)
        .collect();
    pos += 2 * instrument_count;

    let pattern_ptrs: Vec<usize> = (0..pattern_count)
        .map(|i| le16(data, pos + 2 * i) as usize * 16)
        .collect();
    pos += 2 * pattern_count;

    // Default pan: left/right groups when the master volume says stereo,
    // center otherwise, with optional per-channel overrides.
    for ch in 0..channels as usize {
        song.default_pan[ch] = if !stereo {
            0x40
        } else if left_group[ch] {
            0x18
        } else {
            0x60
        };
    }
    if pan_flag == 0xFC {
        if data.len() < pos + 32 {
            return Err(FormatError::ShortInput);
        }
        for (i, &pan) in data[pos..pos + 32].iter().enumerate() {
            if pan & 0x20 != 0 {
                if let Some(ch) = remap[i] {
                    song.default_pan[ch as usize] = (pan & 0x0F) << 3;
                }
            }
        }
    }

    for &ptr in &instrument_ptrs {
        song.samples.push(parse_instrument(data, ptr)?);
    }

    for &ptr in &pattern_ptrs {
        song.patterns.push(parse_pattern(data, ptr, channels, &remap)?);
    }

    Ok(song)
}

fn le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parse an 80-byte instrument header plus its sample payload.
fn parse_instrument(data: &[u8], offset: usize) -> Result<Sample, FormatError> {
    if data.len() < offset + INSTRUMENT_HEADER_LEN {
        return Err(FormatError::ShortInput);
    }
    let header = &data[offset..offset + INSTRUMENT_HEADER_LEN];

    let kind = header[0];
    if kind > 1 {
        return Err(FormatError::UnsupportedSample);
    }

    let mut sample = Sample::new(&parse_name(&header[48..76]));
    if kind == 0 {
        // Empty slot.
        return Ok(sample);
    }

    let memseg = (((header[13] as u32) << 16) | le16(header, 14) as u32) as usize * 16;
    let length = le32(header, 16) as usize;
    let loop_begin = le32(header, 20);
    let loop_end = le32(header, 24);
    sample.volume = header[28].min(64);
    let flags = header[31];
    if flags & 0x04 != 0 {
        // 16-bit payloads are out of scope.
        return Err(FormatError::UnsupportedSample);
    }
    sample.c4_speed = le32(header, 32);
    if sample.c4_speed == 0 {
        sample.c4_speed = 8363;
    }
    if flags & 0x01 != 0 && loop_end > loop_begin {
        sample.loop_start = loop_begin;
        sample.loop_len = loop_end - loop_begin;
    }

    // Sample data is unsigned 8-bit on disk.
    if memseg < data.len() {
        let end = (memseg + length).min(data.len());
        sample.data = data[memseg..end].iter().map(|&b| (b ^ 0x80) as i8).collect();
    }
    sample.normalize_loop();

    Ok(sample)
}

/// Decode one packed pattern.
fn parse_pattern(
    data: &[u8],
    offset: usize,
    channels: u8,
    remap: &[Option<u8>; 32],
) -> Result<Pattern, FormatError> {
    let mut pattern = Pattern::new(channels);
    if offset == 0 {
        // Unallocated pattern slot.
        return Ok(pattern);
    }
    if data.len() < offset + 2 {
        return Err(FormatError::ShortInput);
    }

    let packed_len = le16(data, offset) as usize;
    let end = (offset + 2 + packed_len).min(data.len());
    let mut pos = offset + 2;
    let mut row = 0u16;

    while row < 64 && pos < end {
        let packed = data[pos];
        pos += 1;
        if packed == 0 {
            row += 1;
            continue;
        }

        let field_len = SKIP_LEN[(packed >> 5) as usize];
        if pos + field_len > end {
            return Err(FormatError::ShortInput);
        }

        let Some(channel) = remap[(packed & 0x1F) as usize] else {
            pos += field_len;
            continue;
        };

        let cell = pattern.cell_mut(row, channel);
        if packed & 0x20 != 0 {
            cell.pitch = match data[pos] {
                255 => NO_NOTE,
                254 => KEY_OFF,
                raw => 12 + 12 * (raw >> 4) + (raw & 0x0F),
            };
            cell.sample = data[pos + 1];
            pos += 2;
        }
        if packed & 0x40 != 0 {
            cell.volume = data[pos].min(64);
            pos += 1;
        }
        if packed & 0x80 != 0 {
            let (effect, param) = remap_effect(data[pos], data[pos + 1]);
            cell.effect = effect;
            cell.param = param;
            pos += 2;
        }
    }

    Ok(pattern)
}

/// Remap an S3M effect letter (1 = A, 2 = B, ...) to an internal opcode.
/// Unsupported commands become no-ops.
fn remap_effect(cmd: u8, param: u8) -> (Effect, u8) {
    let effect = match cmd {
        0x01 => Effect::SetSpeed,          // Axx
        0x02 => Effect::JumpToPattern,     // Bxx
        0x03 => Effect::PatternBreak,      // Cxx
        0x04 => Effect::S3MVolumeSlide,    // Dxy
        0x05 => Effect::S3MPortamentoDown, // Exy
        0x06 => Effect::S3MPortamentoUp,   // Fxy
        0x07 => Effect::PortaToNote,       // Gxx
        0x08 => Effect::Vibrato,           // Hxy
        0x0F => Effect::SampleOffset,      // Oxx
        0x13 => return remap_special(param), // Sxy
        0x14 => Effect::SetSpeed,          // Txx, lands in the tempo branch
        0x16 => Effect::S3MGlobalVolume,   // Vxx
        _ => return (Effect::None, 0),
    };
    (effect, param)
}

fn remap_special(param: u8) -> (Effect, u8) {
    match param >> 4 {
        0x8 => (Effect::SetPanPosition, (param & 0x0F) << 3),
        0xB => (Effect::PatternLoop, param & 0x0F),
        // SDx shares the note-delay path with the MOD EDx sub-effect.
        0xD => (Effect::Extended, param),
        _ => (Effect::None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Incremental S3M image builder for tests.
    struct S3mImage {
        data: Vec<u8>,
    }

    impl S3mImage {
        /// Header for a 2-channel stereo file: channel 0 left, channel 1
        /// right, the rest disabled.
        fn new(orders: &[u8], instruments: usize, patterns: usize) -> Self {
            let mut data = vec![0u8; HEADER_LEN];
            data[0..6].copy_from_slice(b"s3mfix");
            data[28] = 0x1A;
            data[29] = 16;
            data[32..34].copy_from_slice(&(orders.len() as u16).to_le_bytes());
            data[34..36].copy_from_slice(&(instruments as u16).to_le_bytes());
            data[36..38].copy_from_slice(&(patterns as u16).to_le_bytes());
            data[42..44].copy_from_slice(&2u16.to_le_bytes());
            data[44..48].copy_from_slice(b"SCRM");
            data[48] = 48; // global volume
            data[49] = 5; // speed
            data[50] = 130; // tempo
            data[51] = 0x80; // stereo
            data[64] = 0; // channel 0: left group
            data[65] = 8; // channel 1: right group
            for setting in &mut data[66..96] {
                *setting = 255;
            }
            data.extend_from_slice(orders);
            Self { data }
        }

        fn align16(&mut self) -> usize {
            while self.data.len() % 16 != 0 {
                self.data.push(0);
            }
            self.data.len()
        }

        /// Reserve the parapointer tables, returning their offset.
        fn reserve_pointers(&mut self, count: usize) -> usize {
            let offset = self.data.len();
            self.data.extend(std::iter::repeat(0).take(2 * count));
            offset
        }

        fn set_pointer(&mut self, table: usize, index: usize, byte_offset: usize) {
            let para = (byte_offset / 16) as u16;
            self.data[table + 2 * index..table + 2 * index + 2]
                .copy_from_slice(&para.to_le_bytes());
        }

        /// Append an instrument header; the payload lands right after it.
        fn push_instrument(&mut self, volume: u8, c4_speed: u32, payload: &[u8]) -> usize {
            let header_at = self.align16();
            let mut header = [0u8; INSTRUMENT_HEADER_LEN];
            header[0] = 1;
            let para = (header_at + INSTRUMENT_HEADER_LEN + 15) / 16 * 16 / 16;
            header[13] = (para >> 16) as u8;
            header[14..16].copy_from_slice(&(para as u16).to_le_bytes());
            header[16..20].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            header[28] = volume;
            header[32..36].copy_from_slice(&c4_speed.to_le_bytes());
            header[48..52].copy_from_slice(b"ins\x00");
            header[76..80].copy_from_slice(b"SCRS");
            self.data.extend_from_slice(&header);
            self.align16();
            self.data.extend_from_slice(payload);
            header_at
        }

        /// Append a packed pattern body (without the length word).
        fn push_pattern(&mut self, packed: &[u8]) -> usize {
            let offset = self.align16();
            self.data
                .extend_from_slice(&(packed.len() as u16).to_le_bytes());
            self.data.extend_from_slice(packed);
            offset
        }
    }

    /// One 2-channel pattern: A-4 ins 1 vol 33 on channel 0, C#3 ins 1 on
    /// channel 1, rest empty.
    fn two_note_pattern() -> Vec<u8> {
        let mut packed = vec![
            0x20 | 0x40, 0x49, 1, 33, // ch 0: note A-4, ins 1, vol 33
            0x21, 0x31, 1, // ch 1: note C#3, ins 1
            0,
        ];
        packed.extend(std::iter::repeat(0).take(63));
        packed
    }

    fn build_simple() -> Vec<u8> {
        let mut image = S3mImage::new(&[0, 255], 1, 1);
        let ins_table = image.reserve_pointers(1);
        let pat_table = image.reserve_pointers(1);
        let ins_at = image.push_instrument(60, 8363, &[0x80u8; 64]);
        let pat_at = image.push_pattern(&two_note_pattern());
        image.set_pointer(ins_table, 0, ins_at);
        image.set_pointer(pat_table, 0, pat_at);
        image.data
    }

    #[test]
    fn bad_magic_rejected() {
        let mut data = build_simple();
        data[44] = b'X';
        assert_eq!(load_s3m(&data), Err(FormatError::UnrecognizedFormat));
    }

    #[test]
    fn short_buffer_rejected() {
        assert_eq!(load_s3m(&[0u8; 40]), Err(FormatError::ShortInput));
    }

    #[test]
    fn header_fields() {
        let song = load_s3m(&build_simple()).unwrap();
        assert_eq!(song.title.as_str(), "s3mfix");
        assert_eq!(song.channels, 2);
        assert_eq!(song.speed, 5);
        assert_eq!(song.tempo, 130);
        assert_eq!(song.global_volume, 48);
        assert_eq!(song.orders, vec![0]);
    }

    #[test]
    fn stereo_group_pans() {
        let song = load_s3m(&build_simple()).unwrap();
        assert_eq!(song.default_pan, vec![0x18, 0x60]);
    }

    #[test]
    fn mono_pans_center() {
        let mut data = build_simple();
        data[51] = 0;
        let song = load_s3m(&data).unwrap();
        assert_eq!(song.default_pan, vec![0x40, 0x40]);
    }

    #[test]
    fn instrument_payload_is_sign_converted() {
        let song = load_s3m(&build_simple()).unwrap();
        let sample = &song.samples[0];
        assert_eq!(sample.volume, 60);
        assert_eq!(sample.len(), 64);
        // 0x80 on disk is silence (0) after the XOR.
        assert!(sample.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn packed_pattern_cells() {
        let song = load_s3m(&build_simple()).unwrap();
        let pattern = &song.patterns[0];

        let cell = pattern.cell(0, 0);
        assert_eq!(cell.pitch, 69); // A-4
        assert_eq!(cell.sample, 1);
        assert_eq!(cell.volume, 33);

        let cell = pattern.cell(0, 1);
        assert_eq!(cell.pitch, 49); // C#3
        assert_eq!(cell.sample, 1);
        assert_eq!(cell.volume, 255);

        assert!(pattern.cell(1, 0).is_empty());
    }

    #[test]
    fn key_off_and_empty_notes() {
        let mut packed = vec![0x20, 254, 0, 0x21, 255, 5, 0];
        packed.extend(std::iter::repeat(0).take(63));

        let mut image = S3mImage::new(&[0, 255], 0, 1);
        let pat_table = image.reserve_pointers(1);
        let pat_at = image.push_pattern(&packed);
        image.set_pointer(pat_table, 0, pat_at);

        let song = load_s3m(&image.data).unwrap();
        assert_eq!(song.patterns[0].cell(0, 0).pitch, KEY_OFF);
        let cell = song.patterns[0].cell(0, 1);
        assert_eq!(cell.pitch, NO_NOTE);
        assert_eq!(cell.sample, 5);
    }

    #[test]
    fn marker_orders_are_kept() {
        let mut image = S3mImage::new(&[0, 254, 0, 255, 0], 0, 1);
        let pat_table = image.reserve_pointers(1);
        let pat_at = image.push_pattern(&[0; 64]);
        image.set_pointer(pat_table, 0, pat_at);

        let song = load_s3m(&image.data).unwrap();
        assert_eq!(song.orders, vec![0, 254, 0]);
    }

    #[test]
    fn effect_remap() {
        assert_eq!(remap_effect(0x01, 6), (Effect::SetSpeed, 6));
        assert_eq!(remap_effect(0x02, 2), (Effect::JumpToPattern, 2));
        assert_eq!(remap_effect(0x03, 0x12), (Effect::PatternBreak, 0x12));
        assert_eq!(remap_effect(0x04, 0x40), (Effect::S3MVolumeSlide, 0x40));
        assert_eq!(remap_effect(0x07, 8), (Effect::PortaToNote, 8));
        assert_eq!(remap_effect(0x0F, 4), (Effect::SampleOffset, 4));
        assert_eq!(remap_effect(0x14, 0x80), (Effect::SetSpeed, 0x80));
        assert_eq!(remap_effect(0x16, 32), (Effect::S3MGlobalVolume, 32));
        // Unsupported letters collapse to no-ops.
        assert_eq!(remap_effect(0x0A, 0x11), (Effect::None, 0));
    }

    #[test]
    fn special_effect_remap() {
        assert_eq!(remap_special(0x83), (Effect::SetPanPosition, 0x18));
        assert_eq!(remap_special(0xB2), (Effect::PatternLoop, 2));
        assert_eq!(remap_special(0xD3), (Effect::Extended, 0xD3));
        assert_eq!(remap_special(0x42), (Effect::None, 0));
    }

    #[test]
    fn sixteen_bit_samples_rejected() {
        let mut image = S3mImage::new(&[0, 255], 1, 0);
        let ins_table = image.reserve_pointers(1);
        let ins_at = image.push_instrument(64, 8363, &[0x80; 16]);
        image.set_pointer(ins_table, 0, ins_at);
        // Set the 16-bit flag in the instrument header.
        image.data[ins_at + 31] = 0x04;
        assert_eq!(load_s3m(&image.data), Err(FormatError::UnsupportedSample));
    }

    #[test]
    fn adlib_instruments_rejected() {
        let mut image = S3mImage::new(&[0, 255], 1, 0);
        let ins_table = image.reserve_pointers(1);
        let ins_at = image.push_instrument(64, 8363, &[0x80; 16]);
        image.set_pointer(ins_table, 0, ins_at);
        image.data[ins_at] = 2; // Adlib melody instrument
        assert_eq!(load_s3m(&image.data), Err(FormatError::UnsupportedSample));
    }

    #[test]
    fn pan_overrides() {
        let mut image = S3mImage::new(&[0, 255], 0, 1);
        image.data[53] = 0xFC;
        let pat_table = image.reserve_pointers(1);
        // 32 pan override bytes follow the parapointers.
        let pan_at = image.data.len();
        image.data.extend(std::iter::repeat(0).take(32));
        image.data[pan_at] = 0x20 | 0x0F; // channel 0: hard right
        image.data[pan_at + 1] = 0x20; // channel 1: hard left
        let pat_at = image.push_pattern(&[0; 64]);
        image.set_pointer(pat_table, 0, pat_at);

        let song = load_s3m(&image.data).unwrap();
        assert_eq!(song.default_pan, vec![0x78, 0x00]);
    }

    #[test]
    fn looping_sample_flags() {
        let mut image = S3mImage::new(&[0, 255], 1, 0);
        let ins_table = image.reserve_pointers(1);
        let ins_at = image.push_instrument(64, 22050, &[0x90; 100]);
        image.set_pointer(ins_table, 0, ins_at);
        image.data[ins_at + 31] = 0x01; // looping
        image.data[ins_at + 20..ins_at + 24].copy_from_slice(&20u32.to_le_bytes());
        image.data[ins_at + 24..ins_at + 28].copy_from_slice(&80u32.to_le_bytes());

        let song = load_s3m(&image.data).unwrap();
        let sample = &song.samples[0];
        assert_eq!(sample.c4_speed, 22050);
        assert_eq!(sample.loop_start, 20);
        assert_eq!(sample.loop_len, 60);
        assert_eq!(sample.data[0], 0x10);
    }
}
