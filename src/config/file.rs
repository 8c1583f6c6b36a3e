//! TOML configuration file loading
//!
//! Supports `~/.config/chirp/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ChirpConfigFile {
    /// Listener and heartbeat settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Device PCM format
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Capture storage
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Outbound pacing
    #[serde(default)]
    pub pacing: PacingFileConfig,

    /// Processing pipeline
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Speech-synthesis provider
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,
}

/// Listener and heartbeat settings
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Listen address
    pub host: Option<String>,

    /// Listen port
    pub port: Option<u16>,

    /// Maximum accepted WebSocket frame size in bytes
    pub max_frame_bytes: Option<usize>,

    /// Seconds between server heartbeat pings
    pub ping_interval_secs: Option<u64>,

    /// Extra seconds to wait for a pong before dropping the peer
    pub ping_timeout_secs: Option<u64>,
}

/// Device PCM format
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    pub sample_rate: Option<u32>,
    pub sample_width: Option<u16>,
    pub channels: Option<u16>,
}

/// Capture storage
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Directory for utterance capture files
    pub dir: Option<String>,
}

/// Outbound pacing
#[derive(Debug, Default, Deserialize)]
pub struct PacingFileConfig {
    /// Interval multiplier (1.0 = real time)
    pub multiplier: Option<f64>,
}

/// Processing pipeline
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Executable invoked with the capture path as its argument
    pub command: Option<String>,
}

/// Speech-synthesis provider
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    /// Sample rate of the float32 PCM requested from the provider
    pub source_rate: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ChirpConfigFile::default()` if the file doesn't exist or can't
/// be parsed.
#[must_use]
pub fn load_config_file() -> ChirpConfigFile {
    let Some(path) = config_file_path() else {
        return ChirpConfigFile::default();
    };

    if !path.exists() {
        return ChirpConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ChirpConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ChirpConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chirp/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chirp").join("config.toml"))
}
