//! Per-format sample decoding and channel downmix for captured PCM bytes.

use crate::models::audio_chunk::AudioFormat;

/// Decode one little-endian sample as an integer (or float for `F32`).
enum Sample {
    Int(i64),
    Float(f32),
}

fn decode(format: AudioFormat, bytes: &[u8]) -> Sample {
    match format {
        AudioFormat::U8 => Sample::Int(bytes[0] as i64),
        AudioFormat::S16 => Sample::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
        AudioFormat::S24 => {
            // sign-extend via the top byte of an i32
            let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            Sample::Int(v as i64)
        }
        AudioFormat::S32 => Sample::Int(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64),
        AudioFormat::F32 => Sample::Float(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        AudioFormat::Unknown => Sample::Int(0),
    }
}

fn encode_int(format: AudioFormat, value: i64, out: &mut Vec<u8>) {
    match format {
        AudioFormat::U8 => out.push(value as u8),
        AudioFormat::S16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        AudioFormat::S24 => out.extend_from_slice(&(value as i32).to_le_bytes()[..3]),
        AudioFormat::S32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
        AudioFormat::F32 | AudioFormat::Unknown => {}
    }
}

/// Normalize one encoded sample to `[-1.0, 1.0]`.
pub fn sample_to_f32(format: AudioFormat, bytes: &[u8]) -> f32 {
    match decode(format, bytes) {
        Sample::Float(v) => v,
        Sample::Int(v) => match format {
            AudioFormat::U8 => (v - 128) as f32 / 128.0,
            AudioFormat::S16 => v as f32 / 32768.0,
            AudioFormat::S24 => v as f32 / 8_388_608.0,
            AudioFormat::S32 => (v as f64 / 2_147_483_648.0) as f32,
            _ => 0.0,
        },
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let frame_count = samples.len() / channels;
    let scale = 1.0 / channels as f32;
    let mut mono = Vec::with_capacity(frame_count);
    for frame in 0..frame_count {
        let mut sum = 0.0f32;
        for ch in 0..channels {
            sum += samples[frame * channels + ch];
        }
        mono.push(sum * scale);
    }
    mono
}

/// Downmix interleaved PCM bytes to one channel, staying in `format`.
///
/// Integer formats are averaged exactly in 64-bit arithmetic. A trailing
/// partial frame is dropped.
pub fn interleaved_to_mono(data: &[u8], format: AudioFormat, channels: usize) -> Vec<u8> {
    let width = format.bytes_per_sample();
    if channels <= 1 || width == 0 {
        return data.to_vec();
    }

    let frame_bytes = width * channels;
    if format == AudioFormat::F32 {
        let samples: Vec<f32> = data
            .chunks_exact(width)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let usable = (data.len() / frame_bytes) * channels;
        return downmix_to_mono(&samples[..usable], channels)
            .into_iter()
            .flat_map(f32::to_le_bytes)
            .collect();
    }

    let mut out = Vec::with_capacity(data.len() / channels);
    for frame in data.chunks_exact(frame_bytes) {
        let sum: i64 = frame
            .chunks_exact(width)
            .map(|b| match decode(format, b) {
                Sample::Int(v) => v,
                Sample::Float(_) => 0,
            })
            .sum();
        encode_int(format, sum / channels as i64, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn downmix_stereo_to_mono() {
        let stereo = [0.2, 0.8, 0.4, 0.6];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert_relative_eq!(mono[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(mono[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn downmix_mono_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn u8_averages_around_unsigned_center() {
        let out = interleaved_to_mono(&[0, 255, 128, 128], AudioFormat::U8, 2);
        assert_eq!(out, vec![127, 128]);
    }

    #[test]
    fn s24_sign_extends() {
        // -2 and -4 as 24-bit little-endian
        let data = [0xFE, 0xFF, 0xFF, 0xFC, 0xFF, 0xFF];
        let out = interleaved_to_mono(&data, AudioFormat::S24, 2);
        assert_eq!(out, vec![0xFD, 0xFF, 0xFF]);
    }

    #[test]
    fn s32_does_not_overflow() {
        let data: Vec<u8> = [i32::MAX, i32::MAX].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = interleaved_to_mono(&data, AudioFormat::S32, 2);
        assert_eq!(out, i32::MAX.to_le_bytes().to_vec());
    }

    #[test]
    fn f32_bytes_downmix() {
        let data: Vec<u8> = [0.25f32, 0.75].iter().flat_map(|v| v.to_le_bytes()).collect();
        let out = interleaved_to_mono(&data, AudioFormat::F32, 2);
        assert_relative_eq!(f32::from_le_bytes([out[0], out[1], out[2], out[3]]), 0.5);
    }

    #[test]
    fn partial_frame_dropped() {
        let data = [1, 0, 3, 0, 5];
        let out = interleaved_to_mono(&data, AudioFormat::S16, 2);
        assert_eq!(out, vec![2, 0]);
    }

    #[test]
    fn sample_normalization_bounds() {
        assert_relative_eq!(sample_to_f32(AudioFormat::U8, &[128]), 0.0);
        assert_relative_eq!(sample_to_f32(AudioFormat::S16, &i16::MIN.to_le_bytes()), -1.0);
        assert_relative_eq!(sample_to_f32(AudioFormat::S24, &[0, 0, 0x80]), -1.0);
    }
}
