/// WAV export for fully assembled audio buffers.
///
/// Live streaming never goes through here: chunks are handed to the
/// transport as wire records. This is for whole-buffer export, for example
/// a client saving the concatenation of everything it received.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::models::audio_chunk::{AudioChunk, AudioFormat};

/// Size of the standard WAV RIFF header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;

/// Generate a 44-byte WAV RIFF header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (format chunk size)
/// [20-21]  format code (1 = PCM, 3 = IEEE float)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * bit_depth / 8
/// [32-33]  block_align = channels * bit_depth / 8
/// [34-35]  bit_depth
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(
    format_code: u16,
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    data_size: u32,
) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate * channels as u32 * bit_depth as u32 / 8;
    let block_align = channels * bit_depth / 8;
    let chunk_size = 36 + data_size;

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&chunk_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&format_code.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bit_depth.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Write `chunk` as a complete WAV stream.
pub fn export_wave<W: Write + ?Sized>(chunk: &AudioChunk, w: &mut W) -> io::Result<()> {
    let format_code = match chunk.format() {
        AudioFormat::F32 => FORMAT_IEEE_FLOAT,
        AudioFormat::Unknown => {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unknown sample format"));
        }
        _ => FORMAT_PCM,
    };
    let data_size = u32::try_from(chunk.byte_len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "audio too large for WAV"))?;
    let bit_depth = (chunk.format().bytes_per_sample() * 8) as u16;

    let header = generate_wav_header(format_code, chunk.frequency(), bit_depth, chunk.channels(), data_size);
    w.write_all(&header)?;
    w.write_all(chunk.data())?;
    Ok(())
}

/// Write `chunk` as a WAV file at `path`, creating parent directories.
pub fn export_wave_to_path(chunk: &AudioChunk, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    export_wave(chunk, &mut w)?;
    w.flush()
}

/// Concatenate consecutive chunks that share a format into one buffer.
///
/// Sentinels are skipped. Returns `None` if the chunks disagree on format,
/// frequency or channel count.
pub fn concat_chunks<'a>(chunks: impl IntoIterator<Item = &'a AudioChunk>) -> Option<AudioChunk> {
    let mut iter = chunks.into_iter().filter(|c| !c.is_sentinel());
    let first = iter.next()?;
    let mut data = first.data().to_vec();
    for chunk in iter {
        if chunk.format() != first.format()
            || chunk.frequency() != first.frequency()
            || chunk.channels() != first.channels()
        {
            return None;
        }
        data.extend_from_slice(chunk.data());
    }
    Some(AudioChunk::new(first.format(), first.frequency(), first.channels(), data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u32(b: &[u8]) -> u32 {
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    #[test]
    fn header_riff_magic() {
        let header = generate_wav_header(FORMAT_PCM, 48000, 16, 2, 0);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn header_48khz_stereo_16bit() {
        let header = generate_wav_header(FORMAT_PCM, 48000, 16, 2, 9600);

        assert_eq!(u16::from_le_bytes([header[20], header[21]]), 1);
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(le_u32(&header[24..28]), 48000);
        assert_eq!(le_u32(&header[28..32]), 192000);
        assert_eq!(u16::from_le_bytes([header[32], header[33]]), 4);
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
        assert_eq!(le_u32(&header[40..44]), 9600);
        assert_eq!(le_u32(&header[4..8]), 36 + 9600);
    }

    #[test]
    fn export_float_chunk_uses_ieee_code() {
        let chunk = AudioChunk::new(AudioFormat::F32, 24000, 1, vec![0u8; 8]);
        let mut out = Vec::new();
        export_wave(&chunk, &mut out).unwrap();

        assert_eq!(out.len(), WAV_HEADER_SIZE + 8);
        assert_eq!(u16::from_le_bytes([out[20], out[21]]), FORMAT_IEEE_FLOAT);
        assert_eq!(u16::from_le_bytes([out[34], out[35]]), 32);
    }

    #[test]
    fn export_unknown_format_fails() {
        let chunk = AudioChunk::new(AudioFormat::Unknown, 24000, 1, vec![0u8; 8]);
        assert!(export_wave(&chunk, &mut Vec::new()).is_err());
    }

    #[test]
    fn export_to_path_writes_file() {
        let path = std::env::temp_dir().join("remote_talk_test").join("export.wav");
        let chunk = AudioChunk::new(AudioFormat::S16, 16000, 1, vec![1, 0, 2, 0]);
        export_wave_to_path(&chunk, &path).unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), WAV_HEADER_SIZE + 4);
        assert_eq!(&data[44..], &[1, 0, 2, 0]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn concat_skips_sentinel_and_checks_format() {
        let a = AudioChunk::new(AudioFormat::S16, 16000, 1, vec![1, 0]);
        let b = AudioChunk::new(AudioFormat::S16, 16000, 1, vec![2, 0]);
        let joined = concat_chunks([&a, &b, &AudioChunk::sentinel()]).unwrap();
        assert_eq!(joined.data(), &[1, 0, 2, 0]);

        let other = AudioChunk::new(AudioFormat::S16, 44100, 1, vec![3, 0]);
        assert!(concat_chunks([&a, &other]).is_none());
        assert!(concat_chunks([&AudioChunk::sentinel()]).is_none());
    }
}
