//! Audio processing
//!
//! Format conversion, playback pacing, and utterance capture. The device
//! side of every path is fixed-rate 16-bit mono PCM; the synthesis side
//! arrives as float32 PCM at the provider's native rate.

pub mod capture;
pub mod convert;
pub mod pacer;

pub use capture::{sanitize_remote_id, RecordingSession};
pub use convert::convert_chunk;
pub use pacer::{Pacer, PacerReport};
