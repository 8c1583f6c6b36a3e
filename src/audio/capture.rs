//! Inbound utterance capture
//!
//! Each utterance a device streams is written to a self-describing WAV file
//! under the configured capture directory. The header (rate, width,
//! channels) is written at creation and never changes; binary frames are
//! appended verbatim as raw 16-bit samples.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::config::DeviceFormat;
use crate::{Error, Result};

/// One open capture file for a single utterance
pub struct RecordingSession {
    path: PathBuf,
    writer: WavWriter<BufWriter<File>>,
    bytes_written: u64,
}

impl RecordingSession {
    /// Open a new capture file for one utterance.
    ///
    /// The file is named from the sanitized remote id and a timestamp, and
    /// the WAV header is written before any audio frame.
    ///
    /// # Errors
    ///
    /// Returns error if the capture directory or file cannot be created.
    pub fn create(dir: &Path, remote_id: &str, format: &DeviceFormat) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            Error::Audio(format!(
                "cannot create capture directory {}: {e}",
                dir.display()
            ))
        })?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("device_{}_{}.wav", sanitize_remote_id(remote_id), timestamp);
        let path = dir.join(filename);

        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.sample_width * 8,
            sample_format: SampleFormat::Int,
        };

        let writer = WavWriter::create(&path, spec).map_err(|e| {
            Error::Audio(format!("cannot open capture file {}: {e}", path.display()))
        })?;

        tracing::debug!(path = %path.display(), "capture file opened");
        Ok(Self {
            path,
            writer,
            bytes_written: 0,
        })
    }

    /// Append one raw 16-bit LE PCM frame verbatim.
    ///
    /// A trailing odd byte is ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying write fails; the session should be
    /// considered closed afterwards.
    pub fn append(&mut self, frame: &[u8]) -> Result<()> {
        for sample in frame.chunks_exact(2) {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            self.writer
                .write_sample(value)
                .map_err(|e| Error::Audio(format!("capture write failed: {e}")))?;
        }
        self.bytes_written += (frame.len() / 2 * 2) as u64;
        Ok(())
    }

    /// Path of the capture file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Audio data bytes written so far
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Finalize the container, returning its path and data byte count.
    ///
    /// # Errors
    ///
    /// Returns error if the header update or flush fails.
    pub fn finalize(self) -> Result<(PathBuf, u64)> {
        self.writer
            .finalize()
            .map_err(|e| Error::Audio(format!("capture finalize failed: {e}")))?;
        tracing::debug!(path = %self.path.display(), bytes = self.bytes_written, "capture file finalized");
        Ok((self.path, self.bytes_written))
    }
}

/// Flatten a remote socket address into a filename-safe id
#[must_use]
pub fn sanitize_remote_id(remote: &str) -> String {
    remote
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
