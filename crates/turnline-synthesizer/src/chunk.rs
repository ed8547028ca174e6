use futures::stream::BoxStream;
use turnline_audio::{encode_as_wav, AudioEncoding};

use crate::ChunkResult;

/// Split `pcm` into chunks of `chunk_size` bytes, WAV-wrapping each one
/// independently when `should_encode_as_wav` is set, flagging the final
/// (possibly short) chunk `is_last_chunk = true` (spec §4.5 "Chunking and
/// encoding").
pub fn pcm_chunk_stream(
    pcm: Vec<u8>,
    chunk_size: usize,
    should_encode_as_wav: bool,
    sampling_rate_hz: u32,
) -> BoxStream<'static, ChunkResult> {
    let chunk_size = chunk_size.max(1);
    Box::pin(async_stream::stream! {
        let mut offset = 0usize;
        if pcm.is_empty() {
            yield ChunkResult { chunk: Vec::new(), is_last_chunk: true };
            return;
        }
        while offset < pcm.len() {
            let end = (offset + chunk_size).min(pcm.len());
            let is_last = end == pcm.len();
            let raw = &pcm[offset..end];
            let chunk = if should_encode_as_wav {
                encode_as_wav(raw, sampling_rate_hz)
            } else {
                raw.to_vec()
            };
            yield ChunkResult { chunk, is_last_chunk: is_last };
            offset = end;
        }
    })
}

/// Encoding-aware PCM chunk size: `chunk_size` is derived from sampling rate
/// and encoding (LINEAR16: 2 bytes/sample, mu-law: 1 byte/sample) times the
/// window in seconds (spec §4.5 / §6).
pub fn chunk_size_for(encoding: AudioEncoding, sampling_rate_hz: u32, seconds: f64) -> usize {
    ((turnline_audio::chunk_size_per_second(encoding, sampling_rate_hz) as f64) * seconds) as usize
}

/// `message_up_to` strategy preferred when the full response length is
/// already known: linear interpolation over character count (spec §4.5).
///
/// Monotone non-decreasing in `seconds` and equal to the full text once
/// `seconds` reaches the estimated total duration (invariant 6, spec §8).
pub fn message_cutoff_from_total_response_length(
    message: &str,
    seconds: f64,
    size_of_output_bytes: usize,
    sampling_rate_hz: u32,
) -> String {
    if message.is_empty() || sampling_rate_hz == 0 {
        return message.to_string();
    }
    let estimated_output_seconds = size_of_output_bytes as f64 / sampling_rate_hz as f64;
    if estimated_output_seconds <= 0.0 {
        return message.to_string();
    }
    let char_count = message.chars().count();
    let estimated_seconds_per_char = estimated_output_seconds / char_count as f64;
    let chars_heard = (seconds / estimated_seconds_per_char).floor().max(0.0) as usize;
    message.chars().take(chars_heard).collect()
}

/// `message_up_to` fallback driven by an assumed speaking rate, recovered by
/// taking the leading N whitespace-delimited tokens (spec §4.5).
pub fn message_cutoff_from_voice_speed(message: &str, seconds: f64, words_per_minute: u32) -> String {
    let words_per_second = words_per_minute as f64 / 60.0;
    let words_spoken = (words_per_second * seconds).floor().max(0.0) as usize;
    message
        .split_whitespace()
        .take(words_spoken)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn chunk_stream_concatenation_matches_input_and_flags_final() {
        let pcm: Vec<u8> = (0u8..50).collect();
        let mut stream = pcm_chunk_stream(pcm.clone(), 16, false, 16000);
        let mut collected = Vec::new();
        let mut last_flags = Vec::new();
        while let Some(result) = stream.next().await {
            last_flags.push(result.is_last_chunk);
            collected.extend(result.chunk);
        }
        assert_eq!(collected, pcm);
        assert_eq!(last_flags.iter().filter(|&&f| f).count(), 1);
        assert_eq!(*last_flags.last().unwrap(), true);
    }

    #[test]
    fn cutoff_from_total_length_is_monotone_and_reaches_full_text() {
        let message = "hello there friend";
        let size = 16000 * 2; // 2 seconds of 16-bit PCM at 16kHz
        let at_zero = message_cutoff_from_total_response_length(message, 0.0, size, 16000);
        let at_half = message_cutoff_from_total_response_length(message, 1.0, size, 16000);
        let at_full = message_cutoff_from_total_response_length(message, 2.0, size, 16000);
        assert!(at_zero.len() <= at_half.len());
        assert!(at_half.len() <= at_full.len());
        assert_eq!(at_full, message);
    }

    #[test]
    fn cutoff_from_voice_speed_recovers_leading_words() {
        let message = "one two three four five";
        let cutoff = message_cutoff_from_voice_speed(message, 1.0, 120);
        assert_eq!(cutoff, "one two");
    }
}
