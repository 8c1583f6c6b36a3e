//! Relay streaming tests with a scripted synthesis backend
//!
//! No network involved: a scripted `SpeechSynthesizer` feeds normalized
//! events and the tests observe the frames queued for the writer task.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use chirp_gateway::config::DeviceFormat;
use chirp_gateway::relay::{stream_reply, OutboundFrame, CLOSE_INTERNAL_ERROR};
use chirp_gateway::synth::{SpeechSynthesizer, SynthEvent, SynthStream};
use chirp_gateway::{Error, Result};

mod common;
use common::{f32le_bytes, sine};

const DEVICE_FORMAT: DeviceFormat = DeviceFormat {
    sample_rate: 16_000,
    sample_width: 2,
    channels: 1,
};

/// Replays a fixed event script as one synthesis stream
struct ScriptedSynth {
    events: Mutex<Option<Vec<SynthEvent>>>,
}

impl ScriptedSynth {
    fn new(events: Vec<SynthEvent>) -> Self {
        Self {
            events: Mutex::new(Some(events)),
        }
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ScriptedSynth {
    async fn stream_speech(&self, _text: &str) -> Result<SynthStream> {
        let events = self.events.lock().unwrap().take().unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        Ok(SynthStream::new(rx))
    }

    fn source_rate(&self) -> u32 {
        24_000
    }
}

/// Backend whose stream never starts
struct FailingSynth;

#[async_trait::async_trait]
impl SpeechSynthesizer for FailingSynth {
    async fn stream_speech(&self, _text: &str) -> Result<SynthStream> {
        Err(Error::Synthesis("provider unreachable".to_string()))
    }

    fn source_rate(&self) -> u32 {
        24_000
    }
}

fn chunk(samples: usize) -> SynthEvent {
    SynthEvent::Chunk(f32le_bytes(&sine(440.0, 24_000, samples, 0.5)))
}

fn drain_audio_lengths(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<usize> {
    let mut lengths = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let OutboundFrame::Audio(data) = frame {
            lengths.push(data.len());
        }
    }
    lengths
}

#[tokio::test]
async fn chunks_convert_and_send_in_order() {
    let synth = ScriptedSynth::new(vec![chunk(1000), chunk(600), chunk(300), SynthEvent::End]);
    let (tx, mut rx) = mpsc::channel(16);

    let started = Instant::now();
    stream_reply(&synth, "hello there", "test", DEVICE_FORMAT, 1.0, &tx).await;
    let elapsed = started.elapsed();

    // round(n * 16000 / 24000) samples, two bytes each, in generation order
    assert_eq!(drain_audio_lengths(&mut rx), vec![667 * 2, 400 * 2, 200 * 2]);

    // (1334 + 800 + 400) bytes at 32000 bytes/s ≈ 79 ms of pacing
    assert!(elapsed >= Duration::from_millis(70), "paced too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "paced too slow: {elapsed:?}");
}

#[tokio::test]
async fn empty_conversion_is_skipped_not_terminal() {
    let synth = ScriptedSynth::new(vec![
        chunk(1000),
        SynthEvent::Chunk(Vec::new()),
        chunk(500),
        SynthEvent::End,
    ]);
    let (tx, mut rx) = mpsc::channel(16);

    stream_reply(&synth, "hello", "test", DEVICE_FORMAT, 0.01, &tx).await;

    assert_eq!(drain_audio_lengths(&mut rx), vec![667 * 2, 333 * 2]);
}

#[tokio::test]
async fn stream_failure_keeps_partial_output() {
    let synth = ScriptedSynth::new(vec![
        chunk(1000),
        SynthEvent::Failed("connection reset".to_string()),
    ]);
    let (tx, mut rx) = mpsc::channel(16);

    stream_reply(&synth, "hello", "test", DEVICE_FORMAT, 0.01, &tx).await;

    // The chunk sent before the failure stands; nothing is retracted and
    // no close frame is pushed for a mid-stream provider error.
    assert_eq!(drain_audio_lengths(&mut rx), vec![667 * 2]);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_text_sends_nothing() {
    let synth = ScriptedSynth::new(vec![chunk(1000), SynthEvent::End]);
    let (tx, mut rx) = mpsc::channel(16);

    stream_reply(&synth, "   ", "test", DEVICE_FORMAT, 1.0, &tx).await;

    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn setup_failure_sends_error_then_close() {
    let (tx, mut rx) = mpsc::channel(16);

    stream_reply(&FailingSynth, "hello", "test", DEVICE_FORMAT, 1.0, &tx).await;

    match rx.try_recv().unwrap() {
        OutboundFrame::Text(text) => assert!(text.starts_with("ERROR:")),
        other => panic!("expected error text frame, got {other:?}"),
    }
    match rx.try_recv().unwrap() {
        OutboundFrame::Close(code, _) => assert_eq!(code, CLOSE_INTERNAL_ERROR),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_connection_ends_the_stream() {
    let synth = Arc::new(ScriptedSynth::new(vec![
        chunk(1000),
        chunk(1000),
        chunk(1000),
        chunk(1000),
        SynthEvent::End,
    ]));
    let (tx, mut rx) = mpsc::channel(1);

    let relay = tokio::spawn({
        let synth = Arc::clone(&synth);
        async move {
            stream_reply(&*synth, "hello", "test", DEVICE_FORMAT, 0.01, &tx).await;
        }
    });

    // Take one frame, then drop the receiver to simulate a disconnect.
    let first = rx.recv().await.unwrap();
    assert!(matches!(first, OutboundFrame::Audio(_)));
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), relay)
        .await
        .expect("relay must stop once the connection is gone")
        .unwrap();
}
