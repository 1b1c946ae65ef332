//! Minimal PCM WAV support for audio track files.
//!
//! Ripped tracks are CD audio: 44.1 kHz, 16-bit, stereo, so one sector
//! holds 2352 bytes = 588 sample frames. The writer emits the canonical
//! 44-byte header; the reader walks the RIFF chunks to find `data`, so
//! files with extra chunks (LIST, fact) still stream correctly.

use std::io::{self, Read, Seek, SeekFrom, Write};

const SAMPLE_RATE: u32 = 44_100;
const CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// Write the 44-byte PCM header for `data_bytes` of audio.
pub fn write_wav_header(w: &mut impl Write, data_bytes: u32) -> io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_bytes).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?; // PCM
    w.write_all(&CHANNELS.to_le_bytes())?;
    w.write_all(&SAMPLE_RATE.to_le_bytes())?;
    w.write_all(&(SAMPLE_RATE * u32::from(BLOCK_ALIGN)).to_le_bytes())?;
    w.write_all(&BLOCK_ALIGN.to_le_bytes())?;
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_bytes.to_le_bytes())?;
    Ok(())
}

/// Position `r` at the start of the `data` chunk and return the chunk
/// length.
pub fn seek_to_data_chunk<R: Read + Seek>(r: &mut R) -> io::Result<u64> {
    let mut riff = [0u8; 12];
    r.seek(SeekFrom::Start(0))?;
    r.read_exact(&mut riff)?;
    if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a RIFF WAVE file",
        ));
    }

    loop {
        let mut header = [0u8; 8];
        r.read_exact(&mut header)?;
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if &header[0..4] == b"data" {
            return Ok(u64::from(size));
        }
        // Chunks are word aligned.
        let skip = u64::from(size) + u64::from(size % 2);
        r.seek(SeekFrom::Current(skip as i64))?;
    }
}

#[cfg(test)]
#[path = "tests/wav_tests.rs"]
mod tests;
