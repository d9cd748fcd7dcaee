//! Online segmentation of a streamed answer into speakable segments.
//!
//! A [`SegmentAccumulator`] owns the text buffer. Every call to
//! [`SegmentAccumulator::add_chunk`] appends to it and, once the configured
//! number of complete sentences is present, cuts the buffer at the last
//! sentence boundary and hands the segment to a synthesis worker. The worker
//! runs on its own task and processes segments strictly one after another,
//! so audio leaves the [`AudioStream`] in the same order as the text that
//! produced it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::boundary::BoundaryDetector;
use crate::config::AccumulatorConfig;
use crate::error::{SpeechError, SpeechResult};
use crate::sanitizer::sanitize;
use crate::synthesis::{AudioPayload, Synthesizer};

const PREVIEW_CHARS: usize = 50;

/// Lifecycle of an accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Accepting chunks.
    Idle,
    /// `flush` started; no more chunks are accepted.
    Finishing,
    /// The end-of-stream request has been queued behind the last segment.
    Closed,
}

/// A sentence-aligned slice of the buffer, numbered in buffer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub sequence: u64,
    pub text: String,
}

/// Items produced by the synthesis worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioItem {
    Audio {
        sequence: u64,
        payload: AudioPayload,
    },
    /// Always the last item, observed exactly once.
    EndOfStream,
}

enum WorkerMessage {
    Segment(Segment),
    Finish,
}

pub struct SegmentAccumulator {
    threshold: usize,
    detector: BoundaryDetector,
    buffer: String,
    state: AccumulatorState,
    next_sequence: u64,
    segments: mpsc::UnboundedSender<WorkerMessage>,
}

impl SegmentAccumulator {
    /// Creates an accumulator and the audio stream fed by its worker.
    ///
    /// Must be called inside a Tokio runtime: the synthesis worker is spawned
    /// immediately. Use one accumulator per conversational turn.
    pub fn new(
        config: AccumulatorConfig,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> SpeechResult<(Self, AudioStream)> {
        config.validate()?;
        let detector = BoundaryDetector::from_config(&config)?;

        let (segment_tx, segment_rx) = mpsc::unbounded_channel();
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(segment_rx, audio_tx, synthesizer));

        let accumulator = Self {
            threshold: config.threshold_value,
            detector,
            buffer: String::new(),
            state: AccumulatorState::Idle,
            next_sequence: 0,
            segments: segment_tx,
        };
        Ok((accumulator, AudioStream::new(audio_rx)))
    }

    /// Appends a chunk and dispatches a segment once the threshold is reached.
    ///
    /// Never waits for synthesis. Rejected with
    /// [`SpeechError::AccumulatorClosed`] after [`flush`](Self::flush).
    pub fn add_chunk(&mut self, text: &str) -> SpeechResult<()> {
        if self.state != AccumulatorState::Idle {
            return Err(SpeechError::AccumulatorClosed);
        }
        if self.segments.is_closed() {
            return Err(SpeechError::ChannelClosed(
                "synthesis worker stopped".to_string(),
            ));
        }
        if text.is_empty() {
            return Ok(());
        }

        self.buffer.push_str(text);
        let boundary = self.detector.detect(&self.buffer);
        if boundary.count < self.threshold {
            return Ok(());
        }

        let Some(split_at) = boundary
            .split_at
            .filter(|&at| at > 0 && self.buffer.is_char_boundary(at))
        else {
            debug!(
                "{} boundaries found but no split point, keeping buffer",
                boundary.count
            );
            return Ok(());
        };

        let remainder = self.buffer.split_off(split_at);
        let segment = std::mem::replace(&mut self.buffer, remainder);
        self.dispatch(segment)
    }

    /// Dispatches whatever is buffered as a final segment and ends the stream.
    ///
    /// Calling it again is a no-op.
    pub fn flush(&mut self) -> SpeechResult<()> {
        if self.state != AccumulatorState::Idle {
            debug!("Accumulator already flushed");
            return Ok(());
        }
        self.state = AccumulatorState::Finishing;

        if !self.buffer.is_empty() {
            let remainder = std::mem::take(&mut self.buffer);
            self.dispatch(remainder)?;
        }

        self.segments
            .send(WorkerMessage::Finish)
            .map_err(|_| SpeechError::ChannelClosed("synthesis worker stopped".to_string()))?;
        self.state = AccumulatorState::Closed;
        Ok(())
    }

    /// Text received but not yet dispatched.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Number of segments handed to the synthesis worker so far.
    pub fn dispatched_segments(&self) -> u64 {
        self.next_sequence
    }

    fn dispatch(&mut self, text: String) -> SpeechResult<()> {
        let segment = Segment {
            sequence: self.next_sequence,
            text,
        };
        self.next_sequence += 1;
        debug!(
            "Dispatching segment {} ({} bytes)",
            segment.sequence,
            segment.text.len()
        );
        self.segments
            .send(WorkerMessage::Segment(segment))
            .map_err(|_| SpeechError::ChannelClosed("synthesis worker stopped".to_string()))
    }
}

impl Drop for SegmentAccumulator {
    fn drop(&mut self) {
        if self.state == AccumulatorState::Idle {
            if !self.buffer.is_empty() {
                warn!(
                    "Accumulator dropped with {} buffered bytes, flushing",
                    self.buffer.len()
                );
            }
            if let Err(err) = self.flush() {
                debug!("Implicit flush on drop failed: {err}");
            }
        }
    }
}

async fn run_worker(
    mut segments: mpsc::UnboundedReceiver<WorkerMessage>,
    audio: mpsc::UnboundedSender<AudioItem>,
    synthesizer: Arc<dyn Synthesizer>,
) {
    while let Some(message) = segments.recv().await {
        let segment = match message {
            WorkerMessage::Segment(segment) => segment,
            WorkerMessage::Finish => break,
        };
        if audio.is_closed() {
            debug!(
                "Audio consumer gone, skipping segment {}",
                segment.sequence
            );
            continue;
        }
        if let Some(payload) = process_segment(synthesizer.as_ref(), &segment).await {
            let item = AudioItem::Audio {
                sequence: segment.sequence,
                payload,
            };
            if audio.send(item).is_err() {
                debug!("Audio consumer dropped before segment {}", segment.sequence);
            }
        }
    }
    let _ = audio.send(AudioItem::EndOfStream);
}

async fn process_segment(synthesizer: &dyn Synthesizer, segment: &Segment) -> Option<AudioPayload> {
    if segment.text.trim().is_empty() {
        return None;
    }
    let text = sanitize(&segment.text);
    if text.trim().is_empty() {
        debug!("Segment {} has nothing speakable", segment.sequence);
        return None;
    }

    let preview: String = text.chars().take(PREVIEW_CHARS).collect();
    info!(
        "Process Text Chunk: {}... (total {} chars)",
        preview,
        text.chars().count()
    );

    match synthesizer.synthesize(&text).await {
        Ok(Some(payload)) if !payload.is_empty() => Some(payload),
        Ok(_) => {
            debug!("Segment {} produced no audio", segment.sequence);
            None
        }
        Err(err) => {
            error!("Error processing segment {}: {}", segment.sequence, err);
            None
        }
    }
}

/// Live, ordered audio produced for one accumulator.
///
/// Ends after the end-of-stream marker; it cannot be restarted.
pub struct AudioStream {
    receiver: mpsc::UnboundedReceiver<AudioItem>,
    finished: bool,
}

impl AudioStream {
    fn new(receiver: mpsc::UnboundedReceiver<AudioItem>) -> Self {
        Self {
            receiver,
            finished: false,
        }
    }

    /// Next raw item, including the terminal [`AudioItem::EndOfStream`].
    ///
    /// Returns `None` only after the marker has been returned.
    pub async fn recv_item(&mut self) -> Option<AudioItem> {
        if self.finished {
            return None;
        }
        let item = self.receiver.recv().await;
        self.settle(item)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn settle(&mut self, item: Option<AudioItem>) -> Option<AudioItem> {
        match item {
            Some(AudioItem::Audio { sequence, payload }) => {
                Some(AudioItem::Audio { sequence, payload })
            }
            // A worker that vanished without its marker still ends the stream once.
            Some(AudioItem::EndOfStream) | None => {
                self.finished = true;
                self.receiver.close();
                Some(AudioItem::EndOfStream)
            }
        }
    }
}

impl Stream for AudioStream {
    type Item = AudioPayload;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(item) => match self.settle(item) {
                Some(AudioItem::Audio { payload, .. }) => Poll::Ready(Some(payload)),
                _ => Poll::Ready(None),
            },
            Poll::Pending => Poll::Pending,
        }
    }
}
