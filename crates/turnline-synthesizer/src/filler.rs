use std::collections::HashMap;

use futures::stream::BoxStream;

use crate::chunk::pcm_chunk_stream;
use crate::{ChunkResult, SynthesizerConfig};

/// Pre-rendered short utterance, playable with zero latency (spec §4.5
/// "FillerAudio / BackTrackingAudio / FollowUpAudio").
#[derive(Debug, Clone)]
pub struct PreRenderedAudio {
    pub message: String,
    pub pcm_bytes: Vec<u8>,
    pub is_interruptable: bool,
    pub seconds_per_chunk: f64,
}

impl PreRenderedAudio {
    /// Chunk by `seconds_per_chunk * bytes_per_second`; remainder chunk is
    /// flagged last (spec §4.5 "FillerAudio playback").
    pub fn chunk_stream(&self, config: &SynthesizerConfig) -> BoxStream<'static, ChunkResult> {
        let chunk_size = crate::chunk::chunk_size_for(
            config.audio_encoding,
            config.sampling_rate_hz,
            self.seconds_per_chunk,
        );
        pcm_chunk_stream(
            self.pcm_bytes.clone(),
            chunk_size,
            config.should_encode_as_wav,
            config.sampling_rate_hz,
        )
    }
}

/// Categorized library of preloaded utterances, populated via
/// `set_filler_audios`/`set_back_tracking_audios`/`set_follow_up_audios`
/// (spec §4.5 public contract).
#[derive(Debug, Clone, Default)]
pub struct FillerAudioLibrary {
    filler: HashMap<String, Vec<PreRenderedAudio>>,
    back_tracking: Vec<PreRenderedAudio>,
    follow_up: Vec<PreRenderedAudio>,
}

impl FillerAudioLibrary {
    pub fn set_filler_audios(&mut self, category: impl Into<String>, audios: Vec<PreRenderedAudio>) {
        self.filler.insert(category.into(), audios);
    }

    pub fn set_back_tracking_audios(&mut self, audios: Vec<PreRenderedAudio>) {
        self.back_tracking = audios;
    }

    pub fn set_follow_up_audios(&mut self, audios: Vec<PreRenderedAudio>) {
        self.follow_up = audios;
    }

    pub fn filler_audios(&self, category: &str) -> &[PreRenderedAudio] {
        self.filler.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn back_tracking_audios(&self) -> &[PreRenderedAudio] {
        &self.back_tracking
    }

    pub fn follow_up_audios(&self) -> &[PreRenderedAudio] {
        &self.follow_up
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use turnline_audio::AudioEncoding;

    #[tokio::test]
    async fn chunk_stream_respects_seconds_per_chunk() {
        let config = SynthesizerConfig {
            audio_encoding: AudioEncoding::Linear16,
            sampling_rate_hz: 1000,
            should_encode_as_wav: false,
            words_per_minute: 150,
        };
        let audio = PreRenderedAudio {
            message: "um".to_string(),
            pcm_bytes: vec![0u8; 5000],
            is_interruptable: false,
            seconds_per_chunk: 1.0,
        };
        let mut stream = audio.chunk_stream(&config);
        let mut chunks = Vec::new();
        while let Some(c) = stream.next().await {
            chunks.push(c);
        }
        // 1000Hz * 2 bytes/sample * 1s = 2000 bytes per chunk; 5000 total -> 3 chunks.
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0..2].iter().all(|c| c.chunk.len() == 2000));
        assert!(chunks.last().unwrap().is_last_chunk);
    }

    #[test]
    fn library_returns_configured_categories() {
        let mut library = FillerAudioLibrary::default();
        library.set_back_tracking_audios(vec![PreRenderedAudio {
            message: "I see...".into(),
            pcm_bytes: vec![0u8; 10],
            is_interruptable: true,
            seconds_per_chunk: 1.0,
        }]);
        assert_eq!(library.back_tracking_audios().len(), 1);
        assert!(library.filler_audios("QUESTIONS").is_empty());
    }
}
