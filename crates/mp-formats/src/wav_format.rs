//! RIFF WAVE writing for rendered PCM.

use std::io::Write;

use mp_engine::Frame;

/// Frames encoded per `write_all` call when streaming PCM out.
const WRITE_CHUNK_FRAMES: usize = 1024;

/// Write interleaved stereo 16-bit frames as a canonical WAV file: the
/// 44-byte header up front (offline rendering knows its frame count), then
/// the PCM payload in chunks.
pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    w.write_all(&wav_header(frames.len(), sample_rate))?;

    let mut chunk = [0u8; WRITE_CHUNK_FRAMES * 4];
    for batch in frames.chunks(WRITE_CHUNK_FRAMES) {
        let mut filled = 0;
        for frame in batch {
            chunk[filled..filled + 2].copy_from_slice(&frame.left.to_le_bytes());
            chunk[filled + 2..filled + 4].copy_from_slice(&frame.right.to_le_bytes());
            filled += 4;
        }
        w.write_all(&chunk[..filled])?;
    }
    Ok(())
}

/// Render frames to an in-memory WAV image.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + frames.len() * 4);
    write_wav(&mut buf, frames, sample_rate).expect("Vec<u8> write cannot fail");
    buf
}

/// The 44-byte RIFF/fmt/data header for 16-bit stereo PCM.
fn wav_header(frame_count: usize, sample_rate: u32) -> [u8; 44] {
    const CHANNELS: u16 = 2;
    const BITS_PER_SAMPLE: u16 = 16;
    const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;
    let data_size = frame_count as u32 * BLOCK_ALIGN as u32;

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // integer PCM
    header[22..24].copy_from_slice(&CHANNELS.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&(sample_rate * BLOCK_ALIGN as u32).to_le_bytes());
    header[32..34].copy_from_slice(&BLOCK_ALIGN.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}
