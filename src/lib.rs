//! Chirp Gateway - real-time audio relay for conversational voice toys
//!
//! This library provides the core functionality for the Chirp gateway:
//! - Device WebSocket sessions (control frames + raw PCM audio)
//! - Utterance capture to self-describing WAV files
//! - Supervised pipeline jobs turning captures into reply text
//! - Synthesis streaming, format conversion, and real-time pacing
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Devices                          │
//! │   control frames  │  mic PCM  │  paced reply PCM    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ WebSocket
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Chirp Gateway                        │
//! │   Session  │  Capture  │  Job  │  Relay + Pacer     │
//! └──────┬─────────────────────────────────────┬────────┘
//!        │ subprocess                          │ HTTP stream
//! ┌──────▼──────────────┐        ┌─────────────▼────────┐
//! │  Processing pipeline │        │  Speech synthesis    │
//! │  (STT → agent)       │        │  provider            │
//! └─────────────────────┘        └──────────────────────┘
//! ```

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod synth;

pub use api::GatewayServer;
pub use config::Config;
pub use error::{Error, Result};
