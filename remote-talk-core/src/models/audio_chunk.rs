use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::processing::downmix;

/// Largest payload accepted when reading a serialized chunk back.
const MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

/// PCM sample encoding of an [`AudioChunk`].
///
/// Discriminants are part of the wire record and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum AudioFormat {
    #[default]
    Unknown = 0,
    U8 = 1,
    S16 = 2,
    S24 = 3,
    S32 = 4,
    F32 = 5,
}

impl AudioFormat {
    /// Bytes per single-channel sample (0 for `Unknown`).
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S24 => 3,
            Self::S32 | Self::F32 => 4,
        }
    }

    /// Map a wave-format description (bits per sample, float flag) to a format.
    pub fn from_bits(bits_per_sample: u16, is_float: bool) -> Self {
        match (bits_per_sample, is_float) {
            (32, true) => Self::F32,
            (8, false) => Self::U8,
            (16, false) => Self::S16,
            (24, false) => Self::S24,
            (32, false) => Self::S32,
            _ => Self::Unknown,
        }
    }

    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::U8,
            2 => Self::S16,
            3 => Self::S24,
            4 => Self::S32,
            5 => Self::F32,
            _ => Self::Unknown,
        }
    }
}

/// An immutable block of captured interleaved PCM samples.
///
/// A chunk with no data is the end-of-speech sentinel: it is never produced
/// by capture (empty commits are dropped) and is appended exactly once per
/// request by the streaming session.
///
/// Wire record (little-endian):
/// ```text
/// [0-3]    format
/// [4-7]    frequency
/// [8-11]   channels
/// [12-19]  byte length N
/// [20..]   N bytes of sample data
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioChunk {
    format: AudioFormat,
    frequency: u32,
    channels: u16,
    data: Vec<u8>,
}

impl AudioChunk {
    pub fn new(format: AudioFormat, frequency: u32, channels: u16, data: Vec<u8>) -> Self {
        Self {
            format,
            frequency,
            channels,
            data,
        }
    }

    /// The zero-length end-of-speech marker.
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Number of complete frames (one sample per channel) in the chunk.
    pub fn sample_length(&self) -> usize {
        let frame = self.format.bytes_per_sample() * self.channels as usize;
        if frame == 0 {
            0
        } else {
            self.data.len() / frame
        }
    }

    /// Read interleaved samples `[begin, end)` normalized to `[-1.0, 1.0]`.
    ///
    /// Indices are clamped to the available samples.
    pub fn read_samples_f32(&self, begin: usize, end: usize) -> Vec<f32> {
        let width = self.format.bytes_per_sample();
        if width == 0 {
            return Vec::new();
        }
        let total = self.data.len() / width;
        let end = end.min(total);
        if begin >= end {
            return Vec::new();
        }
        self.data[begin * width..end * width]
            .chunks_exact(width)
            .map(|bytes| downmix::sample_to_f32(self.format, bytes))
            .collect()
    }

    /// A copy of this chunk downmixed to a single channel.
    pub fn to_mono(&self) -> AudioChunk {
        if self.channels <= 1 || self.format == AudioFormat::Unknown {
            return self.clone();
        }
        AudioChunk {
            format: self.format,
            frequency: self.frequency,
            channels: 1,
            data: downmix::interleaved_to_mono(&self.data, self.format, self.channels as usize),
        }
    }

    /// Write the chunk's wire record to `w`.
    pub fn serialize<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.format as u32).to_le_bytes())?;
        w.write_all(&self.frequency.to_le_bytes())?;
        w.write_all(&(self.channels as u32).to_le_bytes())?;
        w.write_all(&(self.data.len() as u64).to_le_bytes())?;
        w.write_all(&self.data)?;
        Ok(())
    }

    /// Read one wire record from `r`.
    pub fn deserialize<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let mut word = [0u8; 4];
        r.read_exact(&mut word)?;
        let format = AudioFormat::from_u32(u32::from_le_bytes(word));
        r.read_exact(&mut word)?;
        let frequency = u32::from_le_bytes(word);
        r.read_exact(&mut word)?;
        let channels = u32::from_le_bytes(word);
        let channels = u16::try_from(channels)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("bad channel count: {}", channels)))?;

        let mut len = [0u8; 8];
        r.read_exact(&mut len)?;
        let len = u64::from_le_bytes(len);
        if len > MAX_CHUNK_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk too large: {} bytes", len),
            ));
        }
        let mut data = vec![0u8; len as usize];
        r.read_exact(&mut data)?;

        Ok(Self {
            format,
            frequency,
            channels,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn s16(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn sentinel_is_empty() {
        let s = AudioChunk::sentinel();
        assert!(s.is_sentinel());
        assert_eq!(s.byte_len(), 0);
        assert!(!AudioChunk::new(AudioFormat::S16, 48000, 1, vec![0, 0]).is_sentinel());
    }

    #[test]
    fn sample_length_counts_frames() {
        let chunk = AudioChunk::new(AudioFormat::S16, 48000, 2, vec![0u8; 512]);
        assert_eq!(chunk.sample_length(), 128);
        assert_eq!(AudioChunk::sentinel().sample_length(), 0);
    }

    #[test]
    fn format_from_bits() {
        assert_eq!(AudioFormat::from_bits(16, false), AudioFormat::S16);
        assert_eq!(AudioFormat::from_bits(32, true), AudioFormat::F32);
        assert_eq!(AudioFormat::from_bits(32, false), AudioFormat::S32);
        assert_eq!(AudioFormat::from_bits(12, false), AudioFormat::Unknown);
    }

    #[test]
    fn read_samples_normalizes() {
        let chunk = AudioChunk::new(AudioFormat::S16, 22050, 1, s16(&[0, 16384, -32768]));
        let samples = chunk.read_samples_f32(0, 10);
        assert_eq!(samples.len(), 3);
        assert_relative_eq!(samples[0], 0.0);
        assert_relative_eq!(samples[1], 0.5);
        assert_relative_eq!(samples[2], -1.0);
        assert_eq!(chunk.read_samples_f32(1, 2).len(), 1);
        assert!(chunk.read_samples_f32(3, 2).is_empty());
    }

    #[test]
    fn to_mono_halves_stereo() {
        let chunk = AudioChunk::new(AudioFormat::S16, 44100, 2, s16(&[100, 300, -50, -150]));
        let mono = chunk.to_mono();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.frequency(), 44100);
        assert_eq!(mono.data(), s16(&[200, -100]).as_slice());
    }

    #[test]
    fn to_mono_keeps_mono_chunk() {
        let chunk = AudioChunk::new(AudioFormat::S16, 44100, 1, s16(&[1, 2, 3]));
        assert_eq!(chunk.to_mono(), chunk);
    }

    #[test]
    fn wire_record_layout() {
        let chunk = AudioChunk::new(AudioFormat::S16, 48000, 2, vec![1, 2, 3, 4]);
        let mut out = Vec::new();
        chunk.serialize(&mut out).unwrap();

        assert_eq!(out.len(), 20 + 4);
        assert_eq!(u32::from_le_bytes([out[0], out[1], out[2], out[3]]), 2);
        assert_eq!(u32::from_le_bytes([out[4], out[5], out[6], out[7]]), 48000);
        assert_eq!(u32::from_le_bytes([out[8], out[9], out[10], out[11]]), 2);
        assert_eq!(&out[12..20], &4u64.to_le_bytes());
        assert_eq!(&out[20..], &[1, 2, 3, 4]);

        let back = AudioChunk::deserialize(&mut out.as_slice()).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn deserialize_rejects_oversized_length() {
        let mut record = Vec::new();
        record.extend_from_slice(&2u32.to_le_bytes());
        record.extend_from_slice(&48000u32.to_le_bytes());
        record.extend_from_slice(&1u32.to_le_bytes());
        record.extend_from_slice(&u64::MAX.to_le_bytes());

        let err = AudioChunk::deserialize(&mut record.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn deserialize_truncated_record_fails() {
        let mut out = Vec::new();
        AudioChunk::new(AudioFormat::U8, 8000, 1, vec![9; 16]).serialize(&mut out).unwrap();
        out.truncate(out.len() - 1);
        assert!(AudioChunk::deserialize(&mut out.as_slice()).is_err());
    }
}
