//! Speech-synthesis backend boundary
//!
//! The provider exposes a streaming HTTP call that yields raw float32 PCM
//! for a transcript. Responses are normalized into [`SynthEvent`]s before
//! they reach the relay; a worker on the blocking pool pulls the byte
//! stream and hands chunks over a bounded channel, so a slow or stalled
//! provider never touches a connection task.

use std::io::Read;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::SynthConfig;
use crate::{Error, Result};

/// Bounded depth of the worker → relay chunk channel
const STREAM_CHANNEL_DEPTH: usize = 8;

/// Read buffer size for the streaming response body
const READ_CHUNK_BYTES: usize = 4096;

/// Connect timeout for the synthesis endpoint
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One normalized event from a synthesis stream
#[derive(Debug)]
pub enum SynthEvent {
    /// Raw audio bytes in the requested source format
    Chunk(Vec<u8>),
    /// Stream finished normally
    End,
    /// Stream failed; no further events follow
    Failed(String),
}

/// Receiving side of one synthesis stream.
///
/// Dropping the stream signals the producing worker to stop pulling, which
/// closes the remote response.
#[derive(Debug)]
pub struct SynthStream {
    rx: mpsc::Receiver<SynthEvent>,
}

impl SynthStream {
    /// Wrap a channel fed by a synthesis worker
    #[must_use]
    pub fn new(rx: mpsc::Receiver<SynthEvent>) -> Self {
        Self { rx }
    }

    /// Await the next event; a vanished worker reads as a failure
    pub async fn next_event(&mut self) -> SynthEvent {
        self.rx
            .recv()
            .await
            .unwrap_or_else(|| SynthEvent::Failed("synthesis worker terminated".to_string()))
    }
}

/// Streaming text-to-speech source
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing `text`, returning the chunk stream
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started.
    async fn stream_speech(&self, text: &str) -> Result<SynthStream>;

    /// Sample rate of the produced float32 PCM
    fn source_rate(&self) -> u32;
}

/// Request body for the streaming synthesis endpoint
#[derive(Serialize)]
struct SpeechRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceRef<'a>,
    output_format: OutputFormat<'a>,
}

#[derive(Serialize)]
struct VoiceRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct OutputFormat<'a> {
    container: &'a str,
    encoding: &'a str,
    sample_rate: u32,
}

/// Synthesizes speech through the provider's streaming HTTP API
pub struct HttpSynthesizer {
    api_url: String,
    api_key: String,
    voice: String,
    model: String,
    source_rate: u32,
}

impl HttpSynthesizer {
    /// Create a synthesizer from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty.
    pub fn new(config: &SynthConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config(
                "synthesis API key required".to_string(),
            ));
        }

        Ok(Self {
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            model: config.model.clone(),
            source_rate: config.source_rate,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSynthesizer {
    async fn stream_speech(&self, text: &str) -> Result<SynthStream> {
        let request = SpeechRequest {
            model_id: &self.model,
            transcript: text,
            voice: VoiceRef { id: &self.voice },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_f32le",
                sample_rate: self.source_rate,
            },
        };
        let body = serde_json::to_vec(&request)?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_DEPTH);
        let url = self.api_url.clone();
        let api_key = self.api_key.clone();
        tokio::task::spawn_blocking(move || pull_stream(&url, &api_key, body, &tx));

        Ok(SynthStream::new(rx))
    }

    fn source_rate(&self) -> u32 {
        self.source_rate
    }
}

/// Blocking worker: POST the request, then feed response bytes into `tx`
/// until the body ends, an error occurs, or the receiver goes away.
fn pull_stream(url: &str, api_key: &str, body: Vec<u8>, tx: &mpsc::Sender<SynthEvent>) {
    let client = match reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            let _ = tx.blocking_send(SynthEvent::Failed(format!("http client init failed: {e}")));
            return;
        }
    };

    let response = match client
        .post(url)
        .header("Authorization", format!("Bearer {api_key}"))
        .header("Content-Type", "application/json")
        .body(body)
        .send()
    {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.blocking_send(SynthEvent::Failed(format!("synthesis request failed: {e}")));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let _ = tx.blocking_send(SynthEvent::Failed(format!("synthesis error {status}: {body}")));
        return;
    }

    let mut reader = response;
    let mut buf = [0_u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.blocking_send(SynthEvent::End);
                break;
            }
            Ok(n) => {
                // A dropped receiver means the stream was cancelled; dropping
                // the response closes the remote connection.
                if tx.blocking_send(SynthEvent::Chunk(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.blocking_send(SynthEvent::Failed(format!(
                    "synthesis stream read failed: {e}"
                )));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        let config = SynthConfig {
            api_url: "http://localhost:6000/tts/stream".to_string(),
            api_key: String::new(),
            voice: "alloy".to_string(),
            model: "sonic-english".to_string(),
            source_rate: 24_000,
        };
        assert!(HttpSynthesizer::new(&config).is_err());
    }

    #[test]
    fn speech_request_serializes_raw_output_format() {
        let request = SpeechRequest {
            model_id: "sonic-english",
            transcript: "hello",
            voice: VoiceRef { id: "v1" },
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_f32le",
                sample_rate: 24_000,
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"encoding\":\"pcm_f32le\""));
        assert!(json.contains("\"sample_rate\":24000"));
        assert!(json.contains("\"transcript\":\"hello\""));
    }

    #[tokio::test]
    async fn dropped_worker_reads_as_failure() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let mut stream = SynthStream::new(rx);
        assert!(matches!(stream.next_event().await, SynthEvent::Failed(_)));
    }
}
