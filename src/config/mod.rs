//! Configuration management for the Chirp gateway
//!
//! Layered env > TOML file > default. Startup validation is the only fatal
//! error surface in the process: a missing synthesis key, a missing
//! pipeline command, or an unusable device format exits non-zero before
//! any connection is accepted.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener and heartbeat settings
    pub server: ServerConfig,

    /// Fixed PCM format of the device's microphone and speaker path
    pub device: DeviceFormat,

    /// Directory for utterance capture files
    pub capture_dir: PathBuf,

    /// Outbound pacing multiplier (1.0 = real time)
    pub pacing_multiplier: f64,

    /// External processing pipeline
    pub pipeline: PipelineConfig,

    /// Speech-synthesis provider
    pub synthesis: SynthConfig,
}

/// WebSocket server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Maximum accepted WebSocket frame size in bytes
    pub max_frame_bytes: usize,

    /// Interval between server heartbeat pings
    pub ping_interval: Duration,

    /// Grace period for the peer's pong beyond the interval
    pub ping_timeout: Duration,
}

/// Fixed PCM format of a device audio path
#[derive(Debug, Clone, Copy)]
pub struct DeviceFormat {
    /// Samples per second
    pub sample_rate: u32,

    /// Sample width in bytes
    pub sample_width: u16,

    /// Channel count
    pub channels: u16,
}

impl DeviceFormat {
    /// Raw audio throughput of the format
    #[must_use]
    pub const fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.sample_width as u32 * self.channels as u32
    }
}

/// External pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Executable invoked with the capture path as its argument
    pub command: PathBuf,
}

/// Speech-synthesis provider configuration
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Streaming synthesis endpoint
    pub api_url: String,

    /// Bearer token for the provider
    pub api_key: String,

    /// Voice identifier
    pub voice: String,

    /// Synthesis model identifier
    pub model: String,

    /// Sample rate of the float32 PCM requested from the provider
    pub source_rate: u32,
}

impl Config {
    /// Load configuration (env > config file > defaults) and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for fatal misconfiguration: a missing
    /// synthesis API key, a missing pipeline command, an unsupported device
    /// sample width, or a non-positive pacing multiplier.
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();

        let server = ServerConfig {
            host: std::env::var("CHIRP_HOST")
                .ok()
                .or(fc.server.host)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse("CHIRP_PORT").or(fc.server.port).unwrap_or(8765),
            max_frame_bytes: env_parse("CHIRP_MAX_FRAME_BYTES")
                .or(fc.server.max_frame_bytes)
                .unwrap_or(1024 * 1024),
            ping_interval: Duration::from_secs(
                env_parse("CHIRP_PING_INTERVAL_SECS")
                    .or(fc.server.ping_interval_secs)
                    .unwrap_or(20),
            ),
            ping_timeout: Duration::from_secs(
                env_parse("CHIRP_PING_TIMEOUT_SECS")
                    .or(fc.server.ping_timeout_secs)
                    .unwrap_or(15),
            ),
        };

        let device = DeviceFormat {
            sample_rate: env_parse("CHIRP_DEVICE_RATE")
                .or(fc.device.sample_rate)
                .unwrap_or(16_000),
            sample_width: env_parse("CHIRP_DEVICE_WIDTH")
                .or(fc.device.sample_width)
                .unwrap_or(2),
            channels: env_parse("CHIRP_DEVICE_CHANNELS")
                .or(fc.device.channels)
                .unwrap_or(1),
        };

        let capture_dir = std::env::var("CHIRP_CAPTURE_DIR")
            .ok()
            .or(fc.capture.dir)
            .map_or_else(default_capture_dir, PathBuf::from);

        let pacing_multiplier = env_parse("CHIRP_PACING_MULTIPLIER")
            .or(fc.pacing.multiplier)
            .unwrap_or(1.0);

        let pipeline = PipelineConfig {
            command: std::env::var("CHIRP_PIPELINE_COMMAND")
                .ok()
                .or(fc.pipeline.command)
                .map(PathBuf::from)
                .ok_or_else(|| {
                    Error::Config(
                        "pipeline command not configured (CHIRP_PIPELINE_COMMAND or [pipeline].command)"
                            .to_string(),
                    )
                })?,
        };

        let synthesis = SynthConfig {
            api_url: std::env::var("CHIRP_SYNTH_URL")
                .ok()
                .or(fc.synthesis.api_url)
                .unwrap_or_else(|| "http://localhost:6000/tts/stream".to_string()),
            api_key: std::env::var("CHIRP_SYNTH_API_KEY")
                .ok()
                .or(fc.synthesis.api_key)
                .ok_or_else(|| {
                    Error::Config(
                        "synthesis API key not configured (CHIRP_SYNTH_API_KEY or [synthesis].api_key)"
                            .to_string(),
                    )
                })?,
            voice: std::env::var("CHIRP_SYNTH_VOICE")
                .ok()
                .or(fc.synthesis.voice)
                .unwrap_or_else(|| "alloy".to_string()),
            model: std::env::var("CHIRP_SYNTH_MODEL")
                .ok()
                .or(fc.synthesis.model)
                .unwrap_or_else(|| "sonic-english".to_string()),
            source_rate: env_parse("CHIRP_SYNTH_SOURCE_RATE")
                .or(fc.synthesis.source_rate)
                .unwrap_or(24_000),
        };

        let config = Self {
            server,
            device,
            capture_dir,
            pacing_multiplier,
            pipeline,
            synthesis,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the audio path cannot honor
    fn validate(&self) -> Result<()> {
        if self.device.sample_width != 2 {
            return Err(Error::Config(format!(
                "unsupported device sample width {} bytes (only 16-bit audio is supported)",
                self.device.sample_width
            )));
        }
        if self.device.sample_rate == 0 || self.device.channels == 0 {
            return Err(Error::Config(
                "device format must have a nonzero sample rate and channel count".to_string(),
            ));
        }
        if self.pacing_multiplier <= 0.0 {
            return Err(Error::Config(format!(
                "pacing multiplier must be positive, got {}",
                self.pacing_multiplier
            )));
        }
        if self.synthesis.source_rate == 0 {
            return Err(Error::Config(
                "synthesis source rate must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an env var, ignoring unset or malformed values
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Default capture directory: `<data_dir>/chirp/captures`
fn default_capture_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("captures"),
        |d| d.data_dir().join("chirp").join("captures"),
    )
}
