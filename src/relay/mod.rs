//! Synthesis stream relay
//!
//! Forwards one synthesized reply to a device connection: pulls normalized
//! synthesis events, converts each chunk to the device format, paces the
//! sends against real-time playback, and reports drift when the stream
//! ends. Runs inside the owning job task and is cancel-safe — dropping the
//! in-progress future releases the synthesis stream, which stops the
//! worker and closes the remote response.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::audio::convert::convert_chunk;
use crate::audio::pacer::Pacer;
use crate::config::DeviceFormat;
use crate::synth::{SpeechSynthesizer, SynthEvent};

/// WebSocket close code sent on fatal server-side streaming errors
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Maximum transcript characters echoed into log lines
const LOG_TEXT_LEN: usize = 60;

/// One frame queued for a connection's writer task
#[derive(Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Binary audio in the device format
    Audio(Vec<u8>),
    /// Diagnostic text for the device
    Text(String),
    /// Heartbeat ping
    Ping(Vec<u8>),
    /// Close the connection with a code and reason
    Close(u16, String),
}

/// Stream one spoken reply to the device.
///
/// Preconditions (non-empty text, open connection) abort with a log line
/// and no send attempts. Chunks that convert to empty output are skipped,
/// never treated as stream termination. A closed connection mid-stream ends
/// the loop immediately; audio already sent is not retracted.
pub async fn stream_reply(
    synth: &dyn SpeechSynthesizer,
    text: &str,
    remote: &str,
    device: DeviceFormat,
    multiplier: f64,
    outbound: &mpsc::Sender<OutboundFrame>,
) {
    if text.trim().is_empty() {
        tracing::warn!(remote, "skipping synthesis: empty reply text");
        return;
    }
    if outbound.is_closed() {
        tracing::info!(remote, "skipping synthesis: device connection already closed");
        return;
    }

    let preview: String = text.chars().take(LOG_TEXT_LEN).collect();
    tracing::info!(remote, text = %preview, "starting synthesis stream");

    let mut stream = match synth.stream_speech(text).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(remote, error = %e, "synthesis stream setup failed");
            let _ = outbound
                .send(OutboundFrame::Text(
                    "ERROR: speech synthesis unavailable".to_string(),
                ))
                .await;
            let _ = outbound
                .send(OutboundFrame::Close(
                    CLOSE_INTERNAL_ERROR,
                    "synthesis error".to_string(),
                ))
                .await;
            return;
        }
    };

    let mut pacer = Pacer::new(device.bytes_per_second(), multiplier);
    loop {
        match stream.next_event().await {
            SynthEvent::Chunk(raw) => {
                let converted = convert_chunk(&raw, synth.source_rate(), device.sample_rate);
                if converted.is_empty() {
                    continue;
                }

                let len = converted.len();
                let send_start = Instant::now();
                if outbound.send(OutboundFrame::Audio(converted)).await.is_err() {
                    tracing::info!(remote, "device connection closed mid-stream");
                    break;
                }
                pacer.pace(len, send_start.elapsed()).await;
            }
            SynthEvent::End => break,
            SynthEvent::Failed(reason) => {
                tracing::warn!(remote, reason, "synthesis stream failed; keeping audio already sent");
                break;
            }
        }
    }

    let report = pacer.report();
    tracing::info!(
        remote,
        bytes = report.bytes_sent,
        actual_ms = u64::try_from(report.actual.as_millis()).unwrap_or(u64::MAX),
        expected_ms = u64::try_from(report.expected.as_millis()).unwrap_or(u64::MAX),
        slept_ms = u64::try_from(report.slept.as_millis()).unwrap_or(u64::MAX),
        "synthesis stream finished"
    );
}
