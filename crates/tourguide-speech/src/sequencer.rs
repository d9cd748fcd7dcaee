//! Merges generated text and synthesized audio into one ordered event stream.

use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::accumulator::{AudioStream, SegmentAccumulator};
use crate::synthesis::AudioPayload;

/// One event delivered to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "chunk", rename_all = "snake_case")]
pub enum DeliveryEvent {
    Text(String),
    Audio(AudioPayload),
}

impl DeliveryEvent {
    /// Event name used by SSE transports.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryEvent::Text(_) => "text",
            DeliveryEvent::Audio(_) => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Producer {
    Text,
    Audio,
}

enum Queued {
    Event(DeliveryEvent),
    Done(Producer),
}

/// Spawns the text and audio relays for one turn.
pub struct DeliverySequencer;

impl DeliverySequencer {
    /// Relays `text` to the consumer while feeding it through `accumulator`,
    /// and relays every segment of `audio` as it is synthesized.
    ///
    /// The accumulator is flushed exactly once: when `text` ends, when it
    /// yields an error, or when the returned stream is dropped.
    pub fn run<S, E>(text: S, accumulator: SegmentAccumulator, audio: AudioStream) -> DeliveryStream
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(relay_text(text, Some(accumulator), tx.clone()));
        tokio::spawn(relay_audio(audio, tx));
        DeliveryStream::new(rx, 2)
    }

    /// Relays text only, for turns without speech.
    pub fn text_only<S, E>(text: S) -> DeliveryStream
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(relay_text(text, None, tx));
        DeliveryStream::new(rx, 1)
    }
}

async fn relay_text<S, E>(
    text: S,
    mut accumulator: Option<SegmentAccumulator>,
    tx: mpsc::UnboundedSender<Queued>,
) where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut text = Box::pin(text);
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                info!("Consumer disconnected, stopping delivery");
                break;
            }
            next = text.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                if tx
                    .send(Queued::Event(DeliveryEvent::Text(chunk.clone())))
                    .is_err()
                {
                    info!("Consumer disconnected, stopping delivery");
                    break;
                }
                if let Some(accumulator) = accumulator.as_mut() {
                    if let Err(err) = accumulator.add_chunk(&chunk) {
                        error!("Failed to buffer text for speech: {err}");
                        break;
                    }
                }
            }
            Some(Err(err)) => {
                error!("Text stream failed: {err}");
                break;
            }
            None => break,
        }
    }

    if let Some(mut accumulator) = accumulator {
        if let Err(err) = accumulator.flush() {
            error!("Failed to flush speech buffer: {err}");
        }
    }
    let _ = tx.send(Queued::Done(Producer::Text));
}

async fn relay_audio(mut audio: AudioStream, tx: mpsc::UnboundedSender<Queued>) {
    while let Some(payload) = audio.next().await {
        if tx.send(Queued::Event(DeliveryEvent::Audio(payload))).is_err() {
            debug!("Consumer disconnected, dropping remaining audio");
            break;
        }
    }
    let _ = tx.send(Queued::Done(Producer::Audio));
}

/// Ordered output of a [`DeliverySequencer`]; ends once every producer has finished.
pub struct DeliveryStream {
    receiver: mpsc::UnboundedReceiver<Queued>,
    producers: usize,
    finished: bool,
}

impl DeliveryStream {
    fn new(receiver: mpsc::UnboundedReceiver<Queued>, producers: usize) -> Self {
        Self {
            receiver,
            producers,
            finished: false,
        }
    }
}

impl Stream for DeliveryStream {
    type Item = DeliveryEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        loop {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(Queued::Event(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Queued::Done(producer))) => {
                    debug!("{producer:?} producer finished");
                    self.producers = self.producers.saturating_sub(1);
                    if self.producers == 0 {
                        self.finished = true;
                        return Poll::Ready(None);
                    }
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccumulatorConfig;
    use crate::error::SpeechResult;
    use crate::synthesis::Synthesizer;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    #[derive(Default)]
    struct EchoSynthesizer {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>> {
            self.calls.lock().unwrap().push(text.to_string());
            Ok(Some(AudioPayload::Base64(text.to_string())))
        }
    }

    fn text_stream(chunks: &[&str]) -> impl Stream<Item = Result<String, String>> + Send + 'static {
        let items: Vec<Result<String, String>> =
            chunks.iter().map(|chunk| Ok(chunk.to_string())).collect();
        futures::stream::iter(items)
    }

    fn audio(text: &str) -> DeliveryEvent {
        DeliveryEvent::Audio(AudioPayload::Base64(text.to_string()))
    }

    fn text(chunk: &str) -> DeliveryEvent {
        DeliveryEvent::Text(chunk.to_string())
    }

    #[test]
    fn events_serialize_with_type_and_chunk() {
        let json = serde_json::to_value(text("Hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "chunk": "Hi"}));

        let json = serde_json::to_value(DeliveryEvent::Audio(AudioPayload::Binary(vec![1, 2, 3])))
            .unwrap();
        assert_eq!(json, serde_json::json!({"type": "audio", "chunk": "AQID"}));
    }

    #[tokio::test]
    async fn relays_text_and_audio_until_both_finish() {
        let synth = Arc::new(EchoSynthesizer::default());
        let (accumulator, audio_stream) =
            SegmentAccumulator::new(AccumulatorConfig::sentence_pattern(1), synth.clone()).unwrap();

        let events: Vec<DeliveryEvent> = DeliverySequencer::run(
            text_stream(&["Hello there. ", "How are ", "you? ", "Bye"]),
            accumulator,
            audio_stream,
        )
        .collect()
        .await;

        let texts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DeliveryEvent::Text(_)))
            .cloned()
            .collect();
        assert_eq!(
            texts,
            vec![text("Hello there. "), text("How are "), text("you? "), text("Bye")]
        );

        let audios: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, DeliveryEvent::Audio(_)))
            .cloned()
            .collect();
        assert_eq!(
            audios,
            vec![audio("Hello there. "), audio("How are you? "), audio("Bye")]
        );

        let first_text = events.iter().position(|e| *e == text("Hello there. ")).unwrap();
        let first_audio = events.iter().position(|e| *e == audio("Hello there. ")).unwrap();
        assert!(first_text < first_audio);
    }

    #[tokio::test]
    async fn upstream_error_flushes_partial_text() {
        let synth = Arc::new(EchoSynthesizer::default());
        let (accumulator, audio_stream) =
            SegmentAccumulator::new(AccumulatorConfig::sentence_pattern(2), synth.clone()).unwrap();
        let upstream = futures::stream::iter(vec![
            Ok("Partial answer".to_string()),
            Err("connection reset".to_string()),
            Ok("never seen".to_string()),
        ]);

        let events: Vec<_> = DeliverySequencer::run(upstream, accumulator, audio_stream)
            .collect()
            .await;
        assert_eq!(events, vec![text("Partial answer"), audio("Partial answer")]);
    }

    #[tokio::test]
    async fn disconnect_still_flushes_buffered_text() {
        let synth = Arc::new(EchoSynthesizer::default());
        let (accumulator, audio_stream) =
            SegmentAccumulator::new(AccumulatorConfig::sentence_pattern(3), synth.clone()).unwrap();
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<Result<String, String>>();

        let mut delivery = DeliverySequencer::run(
            UnboundedReceiverStream::new(chunk_rx),
            accumulator,
            audio_stream,
        );
        chunk_tx.send(Ok("Still thinking".to_string())).unwrap();
        assert_eq!(delivery.next().await, Some(text("Still thinking")));
        drop(delivery);

        tokio::time::timeout(Duration::from_secs(1), chunk_tx.closed())
            .await
            .expect("text relay should stop reading after disconnect");
        tokio::time::timeout(Duration::from_secs(1), async {
            while synth.calls.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("buffered text should be flushed");
        assert_eq!(*synth.calls.lock().unwrap(), vec!["Still thinking"]);
    }

    #[tokio::test]
    async fn text_only_delivery_has_no_audio() {
        let events: Vec<_> = DeliverySequencer::text_only(text_stream(&["One. ", "Two."]))
            .collect()
            .await;
        assert_eq!(events, vec![text("One. "), text("Two.")]);
    }
}
