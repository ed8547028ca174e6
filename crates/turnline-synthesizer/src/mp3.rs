//! MP3 streaming decode path (spec §4.5 "MP3 streaming path"): a producer
//! feeds raw MP3 bytes into a dedicated decode thread, a consumer drains
//! decoded `(pcm_chunk, is_last)` pairs.
//!
//! This hand-rolls its own thread bridge rather than reusing
//! `turnline_worker::ThreadBridgedWorker` because decoding is N inputs to M
//! outputs (one MP3 byte chunk can yield zero, one, or several PCM frames) —
//! the generic worker's one-item-in/one-item-out `ThreadProcess::process`
//! doesn't fit. The idiom (dedicated OS thread, paired channels, a
//! cancellation token observed at every suspension point) is the same one
//! `turnline-worker` uses.

use std::collections::VecDeque;
use std::io::{Read, Result as IoResult};

use bytes::Bytes;
use crossbeam_channel as cb;
use futures::Stream;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum Mp3Error {
    #[error("no supported mp3 track found")]
    NoTrack,
    #[error("symphonia error: {0}")]
    Symphonia(String),
}

/// Blocking `Read` source fed by a crossbeam channel of byte chunks,
/// terminated by a `None` sentinel (spec §4.5 step 1 "push a sentinel null
/// when the response is exhausted").
struct ChannelSource {
    rx: cb::Receiver<Option<Bytes>>,
    buf: VecDeque<u8>,
    eof: bool,
}

impl Read for ChannelSource {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        while self.buf.is_empty() && !self.eof {
            match self.rx.recv() {
                Ok(Some(chunk)) => self.buf.extend(chunk),
                Ok(None) | Err(_) => self.eof = true,
            }
        }
        let n = out.len().min(self.buf.len());
        for slot in out.iter_mut().take(n) {
            *slot = self.buf.pop_front().expect("checked len above");
        }
        Ok(n)
    }
}

impl MediaSource for ChannelSource {
    fn is_seekable(&self) -> bool {
        false
    }
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Started by the synthesizer's MP3 streaming path. `feed` pushes a chunk of
/// compressed bytes (or `None` to signal end-of-stream); decoded
/// `(pcm_chunk, is_last)` pairs arrive on `output_rx`.
pub struct Mp3DecoderWorker {
    cancel: CancellationToken,
    input_tx: cb::Sender<Option<Bytes>>,
    output_rx: Option<mpsc::UnboundedReceiver<(Vec<u8>, bool)>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Mp3DecoderWorker {
    pub fn start() -> Self {
        let cancel = CancellationToken::new();
        let (input_tx, input_rx) = cb::unbounded::<Option<Bytes>>();
        let (output_tx, output_rx) = mpsc::unbounded_channel();

        let thread_cancel = cancel.clone();
        let thread = std::thread::spawn(move || {
            if let Err(err) = decode_loop(input_rx, &output_tx, &thread_cancel) {
                tracing::warn!(error = %err, "mp3 decode thread ended with error");
            }
        });

        Self {
            cancel,
            input_tx,
            output_rx: Some(output_rx),
            thread: Some(thread),
        }
    }

    pub fn feed(&self, chunk: Bytes) {
        let _ = self.input_tx.send(Some(chunk));
    }

    pub fn finish(&self) {
        let _ = self.input_tx.send(None);
    }

    pub fn output_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<(Vec<u8>, bool)>> {
        self.output_rx.take()
    }

    /// Terminate the decoder worker (spec §4.5 step 4 "on cancellation of
    /// the consumer, terminate the decoder worker").
    pub fn terminate(&mut self) {
        self.cancel.cancel();
        let _ = self.input_tx.send(None);
    }
}

impl Drop for Mp3DecoderWorker {
    fn drop(&mut self) {
        self.terminate();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn decode_loop(
    input_rx: cb::Receiver<Option<Bytes>>,
    output_tx: &mpsc::UnboundedSender<(Vec<u8>, bool)>,
    cancel: &CancellationToken,
) -> Result<(), Mp3Error> {
    let source = ChannelSource {
        rx: input_rx,
        buf: VecDeque::new(),
        eof: false,
    };
    let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Mp3Error::Symphonia(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(Mp3Error::NoTrack)?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Mp3Error::Symphonia(e.to_string()))?;

    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                let duration = audio_buf.capacity() as u64;
                let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(duration, spec));
                buf.copy_interleaved_ref(audio_buf);
                let pcm: Vec<u8> = buf
                    .samples()
                    .iter()
                    .flat_map(|s| s.to_le_bytes())
                    .collect();
                if output_tx.send((pcm, false)).is_err() {
                    break;
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(_) => break,
        }
    }
    let _ = output_tx.send((Vec::new(), true));
    Ok(())
}

/// Producer task (spec §4.5 step 1): read bytes from an upstream HTTP byte
/// stream and feed them into the decoder worker, sending the end-of-stream
/// sentinel once the upstream stream is exhausted.
pub async fn pump_into_decoder<S, E>(mut body: S, worker: &Mp3DecoderWorker)
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    use futures::StreamExt;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => worker.feed(bytes),
            Err(err) => {
                tracing::warn!(error = %err, "http error streaming tts mp3 response, stopping early");
                break;
            }
        }
    }
    worker.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn feeding_garbage_bytes_still_terminates_with_last_flag() {
        let mut worker = Mp3DecoderWorker::start();
        let mut output = worker.output_receiver().expect("output receiver");
        worker.feed(Bytes::from_static(b"not an mp3 stream"));
        worker.finish();

        let mut saw_last = false;
        while let Ok(Some((_, is_last))) =
            tokio::time::timeout(std::time::Duration::from_millis(500), output.recv()).await
        {
            if is_last {
                saw_last = true;
                break;
            }
        }
        assert!(saw_last, "decode loop should always emit a terminal marker");
    }

    #[tokio::test]
    async fn pump_into_decoder_forwards_chunks_and_finishes() {
        let worker = Mp3DecoderWorker::start();
        let body = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);
        pump_into_decoder(body, &worker).await;
        // finish() was called; dropping the worker joins the decode thread.
        drop(worker);
    }
}
