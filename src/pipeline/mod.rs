//! External processing pipeline invocation
//!
//! A finalized capture is handed to a configured executable which runs the
//! transcription and agent stages and prints the reply text on a marked
//! stdout line. The child is spawned with kill-on-drop, so a cancelled job
//! always terminates the external process.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::{Error, Result};

/// stdout line prefix carrying the pipeline's reply text
pub const RESPONSE_MARKER: &str = "FINAL_LLM_RESPONSE:";

/// Run the pipeline over one capture file and extract the reply text.
///
/// Returns `Ok(None)` when the pipeline exits non-zero or never prints the
/// marker line — those are logged, not errors.
///
/// # Errors
///
/// Returns error if the process cannot be spawned or its output collected.
pub async fn run(command: &Path, capture: &Path) -> Result<Option<String>> {
    tracing::info!(
        command = %command.display(),
        capture = %capture.display(),
        "launching pipeline"
    );

    let child = Command::new(command)
        .arg(capture)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Pipeline(format!("failed to launch {}: {e}", command.display())))?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::Pipeline(format!("failed to collect pipeline output: {e}")))?;

    if !output.stderr.is_empty() {
        tracing::debug!(stderr = %String::from_utf8_lossy(&output.stderr), "pipeline stderr");
    }

    if !output.status.success() {
        tracing::warn!(status = %output.status, "pipeline exited with failure");
        return Ok(None);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let reply = parse_reply(&stdout);
    if reply.is_none() {
        tracing::warn!("pipeline succeeded but printed no {RESPONSE_MARKER} line");
    }
    Ok(reply)
}

/// Extract the reply text from pipeline stdout
#[must_use]
pub fn parse_reply(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix(RESPONSE_MARKER))
        .map(|rest| rest.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Deletes a capture file when dropped.
///
/// Held by the job task so the recording is removed after processing no
/// matter how the job ends, cancellation included.
#[derive(Debug)]
pub struct CaptureFileGuard {
    path: PathBuf,
}

impl CaptureFileGuard {
    /// Guard the capture at `path`
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for CaptureFileGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "capture file deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to delete capture file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_extracted_from_marked_line() {
        let stdout = "loading model\nFINAL_LLM_RESPONSE:hello there\ndone\n";
        assert_eq!(parse_reply(stdout), Some("hello there".to_string()));
    }

    #[test]
    fn reply_is_trimmed() {
        assert_eq!(
            parse_reply("FINAL_LLM_RESPONSE:  spaced out  \n"),
            Some("spaced out".to_string())
        );
    }

    #[test]
    fn first_marked_line_wins() {
        let stdout = "FINAL_LLM_RESPONSE:first\nFINAL_LLM_RESPONSE:second\n";
        assert_eq!(parse_reply(stdout), Some("first".to_string()));
    }

    #[test]
    fn missing_marker_yields_none() {
        assert_eq!(parse_reply("all good, no reply\n"), None);
    }

    #[test]
    fn empty_reply_text_yields_none() {
        assert_eq!(parse_reply("FINAL_LLM_RESPONSE:   \n"), None);
    }

    #[test]
    fn marker_must_start_the_line() {
        assert_eq!(parse_reply("note: FINAL_LLM_RESPONSE:hi\n"), None);
    }
}
