//! Shared audio encoding primitives: sample formats, chunk-size math, silence
//! padding and WAV wrapping.
//!
//! Kept as its own crate so the transcriber (silence padding on mute) and the
//! synthesizer (chunking, WAV rewrap) agree on one definition instead of
//! duplicating the encoding rules.

use std::io::Cursor;

/// Audio sample encoding used on the wire between transcriber/synthesizer
/// and the telephony/codec layer (out of scope — only the encoding rules
/// that affect chunk sizing and silence padding live here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// 16-bit signed PCM, little-endian, arbitrary sampling rate.
    Linear16,
    /// G.711 mu-law, locked to 8 kHz.
    Mulaw,
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("mu-law encoding requires an 8000 Hz sampling rate, got {0}")]
    MulawRequires8kHz(u32),
}

pub type Result<T> = std::result::Result<T, AudioError>;

impl AudioEncoding {
    /// Bytes per sample for this encoding.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioEncoding::Linear16 => 2,
            AudioEncoding::Mulaw => 1,
        }
    }

    /// Validate a sampling rate against encoding constraints (mu-law is
    /// locked to 8 kHz; LINEAR16 accepts anything).
    pub fn validate_sampling_rate(&self, sampling_rate_hz: u32) -> Result<()> {
        match self {
            AudioEncoding::Linear16 => Ok(()),
            AudioEncoding::Mulaw if sampling_rate_hz == 8000 => Ok(()),
            AudioEncoding::Mulaw => Err(AudioError::MulawRequires8kHz(sampling_rate_hz)),
        }
    }
}

/// Number of bytes per second of audio at the given encoding/sampling rate.
pub fn chunk_size_per_second(encoding: AudioEncoding, sampling_rate_hz: u32) -> usize {
    sampling_rate_hz as usize * encoding.bytes_per_sample()
}

/// Build a silent chunk of `len_bytes` for the given encoding, preserving
/// downstream timing when a transcriber is muted.
///
/// LINEAR16 silence is all-zero bytes. Mu-law silence is the mu-law encoding
/// of zero-amplitude PCM, which is *not* the zero byte (G.711 zero maps to
/// 0xFF/0x7F depending on sign convention; this follows the standard ITU
/// encoder below, which maps a zero sample to `0xFF`).
pub fn silent_chunk(encoding: AudioEncoding, len_bytes: usize) -> Vec<u8> {
    match encoding {
        AudioEncoding::Linear16 => vec![0u8; len_bytes],
        AudioEncoding::Mulaw => vec![mulaw_encode_sample(0); len_bytes],
    }
}

const MULAW_BIAS: i16 = 0x84;
const MULAW_CLIP: i16 = 32635;

/// Encode one 16-bit linear PCM sample to G.711 mu-law.
pub fn mulaw_encode_sample(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80u8 } else { 0x00u8 };
    let mut magnitude = if sample < 0 {
        (-(sample as i32)) as i16
    } else {
        sample
    };
    if magnitude > MULAW_CLIP {
        magnitude = MULAW_CLIP;
    }
    magnitude += MULAW_BIAS;

    let mut exponent: i16 = 7;
    let mut mask: i16 = 0x4000;
    while exponent > 0 && (magnitude & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0f;
    let byte = (sign as i16) | (exponent << 4) | mantissa;
    !(byte as u8)
}

/// Encode a buffer of LINEAR16 little-endian bytes to mu-law.
pub fn linear16_to_mulaw(linear: &[u8]) -> Vec<u8> {
    linear
        .chunks_exact(2)
        .map(|pair| mulaw_encode_sample(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Wrap a raw PCM (LINEAR16) chunk as a self-contained, single-channel WAV
/// file. Each synthesizer chunk is re-wrapped independently so every chunk
/// is playable on its own.
pub fn encode_as_wav(pcm: &[u8], sampling_rate_hz: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sampling_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut buf, spec).expect("valid wav spec");
        for pair in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer.write_sample(sample).expect("in-memory write");
        }
        writer.finalize().expect("in-memory finalize");
    }
    buf.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mulaw_silence_is_not_zero_byte() {
        assert_eq!(mulaw_encode_sample(0), 0xFF);
    }

    #[test]
    fn linear16_silent_chunk_is_zero_filled() {
        let chunk = silent_chunk(AudioEncoding::Linear16, 320);
        assert_eq!(chunk.len(), 320);
        assert!(chunk.iter().all(|&b| b == 0));
    }

    #[test]
    fn mulaw_silent_chunk_preserves_length_and_value() {
        let chunk = silent_chunk(AudioEncoding::Mulaw, 160);
        assert_eq!(chunk.len(), 160);
        assert!(chunk.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn mulaw_rejects_non_8khz() {
        assert!(AudioEncoding::Mulaw.validate_sampling_rate(16000).is_err());
        assert!(AudioEncoding::Mulaw.validate_sampling_rate(8000).is_ok());
    }

    #[test]
    fn chunk_size_per_second_matches_encoding() {
        assert_eq!(chunk_size_per_second(AudioEncoding::Linear16, 16000), 32000);
        assert_eq!(chunk_size_per_second(AudioEncoding::Mulaw, 8000), 8000);
    }

    #[test]
    fn wav_wrap_has_riff_header() {
        let pcm = vec![0u8; 32000]; // 1 second of silence at 16kHz/16-bit
        let wav = encode_as_wav(&pcm, 16000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }
}
