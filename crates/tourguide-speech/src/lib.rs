//! # Tourguide Speech
//!
//! Streaming text-to-speech segmentation for the tour-guide agent.
//!
//! Text generated by a language model arrives in arbitrary fragments. This
//! crate turns those fragments into sentence-aligned segments, strips
//! markup that cannot be spoken, synthesizes each segment off the producer's
//! path, and merges text and audio into a single ordered event stream.
//!
//! ## Components
//! - [`sanitize`]: removes inline image markup
//! - [`BoundaryDetector`]: counts complete sentences and finds the split point
//! - [`SegmentAccumulator`]: buffers chunks and dispatches segments
//! - [`Synthesizer`]: the text to audio boundary ([`BlockingSynthesizer`], `SpeechClient`)
//! - [`DeliverySequencer`]: relays text and audio events to the transport
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use tourguide_speech::{AccumulatorConfig, AudioPayload, BlockingSynthesizer, SegmentAccumulator};
//!
//! # async fn demo() -> tourguide_speech::SpeechResult<()> {
//! let tts = BlockingSynthesizer::new(|text: &str| {
//!     Ok(Some(AudioPayload::Binary(text.as_bytes().to_vec())))
//! });
//! let (mut accumulator, mut audio) =
//!     SegmentAccumulator::new(AccumulatorConfig::sentence_pattern(2), Arc::new(tts))?;
//!
//! accumulator.add_chunk("The vase is blue. ")?;
//! accumulator.add_chunk("It dates from the 1400s. ")?;
//! accumulator.flush()?;
//!
//! while let Some(segment) = audio.next().await {
//!     println!("{} bytes of audio", segment.to_base64().len());
//! }
//! # Ok(())
//! # }
//! ```

mod accumulator;
mod boundary;
pub mod config;
pub mod error;
mod sanitizer;
mod sequencer;
mod synthesis;

pub use accumulator::{AccumulatorState, AudioItem, AudioStream, Segment, SegmentAccumulator};
pub use boundary::{Boundary, BoundaryDetector};
pub use config::{AccumulatorConfig, DEFAULT_SENTENCE_PATTERN, ThresholdMode};
pub use error::{SpeechError, SpeechResult};
pub use sanitizer::sanitize;
pub use sequencer::{DeliveryEvent, DeliverySequencer, DeliveryStream};
pub use synthesis::{AudioPayload, BlockingSynthesizer, Synthesizer};

#[cfg(feature = "http-client")]
pub use synthesis::{SpeechClient, SpeechClientConfig};
