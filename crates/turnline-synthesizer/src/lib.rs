//! Turns `Message` text into audio chunks the playback layer can stream to
//! the caller, plus an inverse mapping from elapsed seconds to spoken-text
//! prefix (spec §4.5).
//!
//! The concrete TTS engine is an external collaborator (spec §1); only its
//! streaming contract (`Synthesizer::create_speech`) is specified, along
//! with the chunking/WAV-wrapping rules and the MP3 decode path that every
//! concrete engine shares.

mod chunk;
mod filler;
mod mp3;

pub use chunk::{
    chunk_size_for, message_cutoff_from_total_response_length, message_cutoff_from_voice_speed,
    pcm_chunk_stream,
};
pub use filler::{FillerAudioLibrary, PreRenderedAudio};
pub use mp3::{pump_into_decoder, Mp3DecoderWorker, Mp3Error};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::Stream;
use turnline_audio::AudioEncoding;

#[derive(Debug, thiserror::Error)]
pub enum SynthesizerError {
    #[error("tts engine error: {0}")]
    Engine(String),
    #[error(transparent)]
    Mp3(#[from] Mp3Error),
}

pub type Result<T> = std::result::Result<T, SynthesizerError>;

#[derive(Debug, Clone, Copy)]
pub struct SynthesizerConfig {
    pub audio_encoding: AudioEncoding,
    pub sampling_rate_hz: u32,
    pub should_encode_as_wav: bool,
    pub words_per_minute: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            audio_encoding: AudioEncoding::Linear16,
            sampling_rate_hz: 16_000,
            should_encode_as_wav: false,
            words_per_minute: 150,
        }
    }
}

/// One chunk of audio, flagged when it is the final chunk of a stream (spec
/// §3 "SynthesisResult", §8 invariant 5).
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk: Vec<u8>,
    pub is_last_chunk: bool,
}

/// A lazy chunk stream paired with the function that reconstructs the
/// spoken-text prefix given how long audio actually played (spec §3
/// "SynthesisResult").
pub struct SynthesisResult {
    pub chunk_stream: BoxStream<'static, ChunkResult>,
    message_up_to: Arc<dyn Fn(f64) -> String + Send + Sync>,
}

impl SynthesisResult {
    pub fn new(
        chunk_stream: BoxStream<'static, ChunkResult>,
        message_up_to: impl Fn(f64) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            chunk_stream,
            message_up_to: Arc::new(message_up_to),
        }
    }

    pub fn message_up_to(&self, seconds: f64) -> String {
        (self.message_up_to)(seconds)
    }
}

/// Narrow streaming contract for the concrete TTS engine (out of scope per
/// spec §1 — only this interface plus the chunking/WAV helpers in this
/// crate are specified).
#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn create_speech(
        &self,
        message: &str,
        chunk_size: usize,
        sentiment: Option<&str>,
    ) -> Result<SynthesisResult>;
}

/// Build a `SynthesisResult` from a fully-buffered PCM response (the common
/// case for a non-streaming TTS call): chunks it per `chunk_size`/WAV config
/// and reconstructs `message_up_to` from the total response length, the
/// preferred strategy per spec §4.5.
pub fn synthesis_result_from_pcm(
    config: &SynthesizerConfig,
    message: impl Into<String>,
    pcm: Vec<u8>,
    chunk_size: usize,
) -> SynthesisResult {
    let message = message.into();
    let total_len = pcm.len();
    let sampling_rate = config.sampling_rate_hz;
    let stream = pcm_chunk_stream(pcm, chunk_size, config.should_encode_as_wav, sampling_rate);
    SynthesisResult::new(stream, move |seconds| {
        message_cutoff_from_total_response_length(&message, seconds, total_len, sampling_rate)
    })
}

/// Build a `SynthesisResult` for the voice-speed fallback strategy, used
/// when the full response length isn't known upfront (spec §4.5
/// "message_up_to" second strategy).
pub fn synthesis_result_with_voice_speed_cutoff(
    config: &SynthesizerConfig,
    message: impl Into<String>,
    pcm: Vec<u8>,
    chunk_size: usize,
) -> SynthesisResult {
    let message = message.into();
    let words_per_minute = config.words_per_minute;
    let stream = pcm_chunk_stream(
        pcm,
        chunk_size,
        config.should_encode_as_wav,
        config.sampling_rate_hz,
    );
    SynthesisResult::new(stream, move |seconds| {
        message_cutoff_from_voice_speed(&message, seconds, words_per_minute)
    })
}

/// Drives the MP3 streaming path end to end (spec §4.5 "MP3 streaming
/// path"): spawns the producer task feeding `body` into a fresh decoder
/// worker, and returns a `SynthesisResult` whose chunk stream drains the
/// decoder's output, re-wrapping as WAV when configured and closing
/// `tracing_span` on the last chunk. `message_up_to` for this path falls
/// back to voice-speed, since the total decoded length isn't known until
/// the stream is exhausted.
pub fn synthesis_result_from_mp3_stream<S, E>(
    config: &SynthesizerConfig,
    message: impl Into<String>,
    body: S,
    tracing_span: tracing::Span,
) -> SynthesisResult
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let message: String = message.into();
    let words_per_minute = config.words_per_minute;
    let should_wrap = config.should_encode_as_wav;
    let sampling_rate = config.sampling_rate_hz;

    let mut worker = Mp3DecoderWorker::start();
    let mut decoded_rx = worker
        .output_receiver()
        .expect("freshly started worker always has an output receiver");

    tokio::spawn(pump_into_decoder(body, &worker));

    let stream: BoxStream<'static, ChunkResult> = Box::pin(async_stream::stream! {
        // Keep the worker alive for the lifetime of the stream; it is
        // terminated either when this generator is dropped (consumer
        // cancellation, spec §4.5 step 4) or when the decoder emits its
        // terminal marker.
        let _worker = worker;
        let _entered_span = tracing_span.enter();
        loop {
            match decoded_rx.recv().await {
                Some((pcm, is_last)) => {
                    let chunk = if should_wrap {
                        turnline_audio::encode_as_wav(&pcm, sampling_rate)
                    } else {
                        pcm
                    };
                    yield ChunkResult { chunk, is_last_chunk: is_last };
                    if is_last {
                        break;
                    }
                }
                None => break,
            }
        }
    });

    SynthesisResult::new(stream, move |seconds| {
        message_cutoff_from_voice_speed(&message, seconds, words_per_minute)
    })
}
