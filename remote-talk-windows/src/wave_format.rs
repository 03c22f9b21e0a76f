use remote_talk_core::capture::buffer_commit::BufferFormat;
use remote_talk_core::models::audio_chunk::AudioFormat;

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size of `WAVEFORMATEXTENSIBLE`, the largest format a buffer reports.
pub const FORMAT_BUFFER_SIZE: usize = 40;

/// Decode a `WAVEFORMATEX` or `WAVEFORMATEXTENSIBLE` structure.
pub fn parse_wave_format(bytes: &[u8]) -> Option<BufferFormat> {
    if bytes.len() < 16 {
        return None;
    }
    let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
    let tag = u16_at(0);
    let channels = u16_at(2);
    let frequency = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let bits = u16_at(14);

    let is_float = match tag {
        WAVE_FORMAT_PCM => false,
        WAVE_FORMAT_IEEE_FLOAT => true,
        // the sub-format GUID's first field is the base tag
        WAVE_FORMAT_EXTENSIBLE if bytes.len() >= FORMAT_BUFFER_SIZE => match u16_at(24) {
            WAVE_FORMAT_PCM => false,
            WAVE_FORMAT_IEEE_FLOAT => true,
            _ => return None,
        },
        _ => return None,
    };

    Some(BufferFormat {
        format: AudioFormat::from_bits(bits, is_float),
        frequency,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave_format(tag: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&rate.to_le_bytes());
        bytes.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&bits.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn pcm16_stereo() {
        let format = parse_wave_format(&wave_format(WAVE_FORMAT_PCM, 2, 44100, 16)).unwrap();
        assert_eq!(format.format, AudioFormat::S16);
        assert_eq!(format.channels, 2);
        assert_eq!(format.frequency, 44100);
    }

    #[test]
    fn ieee_float() {
        let format = parse_wave_format(&wave_format(WAVE_FORMAT_IEEE_FLOAT, 1, 48000, 32)).unwrap();
        assert_eq!(format.format, AudioFormat::F32);
    }

    #[test]
    fn extensible_uses_sub_format() {
        let mut bytes = wave_format(WAVE_FORMAT_EXTENSIBLE, 2, 48000, 32);
        bytes.resize(FORMAT_BUFFER_SIZE, 0);
        bytes[24] = WAVE_FORMAT_IEEE_FLOAT as u8;
        assert_eq!(parse_wave_format(&bytes).unwrap().format, AudioFormat::F32);

        bytes[24] = WAVE_FORMAT_PCM as u8;
        assert_eq!(parse_wave_format(&bytes).unwrap().format, AudioFormat::S32);

        // truncated extensible header
        assert!(parse_wave_format(&bytes[..18]).is_none());
    }

    #[test]
    fn rejects_compressed_and_short() {
        assert!(parse_wave_format(&wave_format(0x0055, 2, 44100, 0)).is_none());
        assert!(parse_wave_format(&[1, 0, 2]).is_none());
    }
}
