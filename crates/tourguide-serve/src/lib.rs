//! # Tour Guide Serve
//!
//! Assembles the tour guide agent from a YAML configuration and exposes it
//! over HTTP with streamed text and audio.

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{ServiceBuilder, TourGuideService};
pub use config::{TourGuideConfig, parse_yaml_file, parse_yaml_str, validate_config};
pub use error::{Result, ServeError};

#[cfg(feature = "http-serve")]
mod server;

#[cfg(feature = "http-serve")]
pub use server::{ChatRequest, HealthResponse, SpeechRequest, SpeechResponse, serve};
