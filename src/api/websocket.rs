//! WebSocket handler for device audio sessions
//!
//! Protocol, per connected device:
//!
//! - inbound text control frames: `START_RECORDING`, `STOP_RECORDING`,
//!   `STOP_RECORDING_ERROR`; any other text is ignored
//! - inbound binary frames: raw 16-bit LE PCM, appended to the open capture
//! - outbound binary frames: paced 16-bit LE PCM of the synthesized reply
//!
//! Each connection owns at most one recording session and one background
//! job (pipeline → relay). A new `START_RECORDING` supersedes an unfinished
//! job; disconnect cleanup is unconditional.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::GatewayState;
use crate::audio::capture::RecordingSession;
use crate::pipeline::{self, CaptureFileGuard};
use crate::relay::{self, OutboundFrame};

/// Control token opening a recording session
pub const START_RECORDING: &str = "START_RECORDING";
/// Control token closing a recording session and triggering processing
pub const STOP_RECORDING: &str = "STOP_RECORDING";
/// Control token closing a recording session after a device-side error
pub const STOP_RECORDING_ERROR: &str = "STOP_RECORDING_ERROR";

/// Outbound channel depth; pacing keeps it drained
const OUTBOUND_DEPTH: usize = 32;

/// Build the WebSocket router
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws/audio", get(ws_upgrade))
        .with_state(state)
}

/// Handle the WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_frame = state.config.server.max_frame_bytes;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Drive one device connection to completion
async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, addr: SocketAddr) {
    let remote = addr.to_string();
    tracing::info!(remote, "device connected");
    state.registry.register(&remote);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_DEPTH);

    // Writer task: sole holder of the sink; the control path and relays
    // queue frames through the channel.
    let writer_remote = remote.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let result = match frame {
                OutboundFrame::Audio(data) => sender.send(Message::Binary(data.into())).await,
                OutboundFrame::Text(text) => sender.send(Message::Text(text.into())).await,
                OutboundFrame::Ping(data) => sender.send(Message::Ping(data.into())).await,
                OutboundFrame::Close(code, reason) => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if result.is_err() {
                tracing::debug!(remote = %writer_remote, "outbound send failed; stopping writer");
                break;
            }
        }
    });

    let mut connection = Connection::new(state.clone(), remote.clone(), tx);

    let mut ping = tokio::time::interval(state.config.server.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first real
    // ping lands one interval in.
    ping.tick().await;

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(message)) => {
                    if !connection.handle_message(message) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(remote, error = %e, "websocket error");
                    break;
                }
                None => break,
            },
            _ = ping.tick() => {
                if connection.heartbeat_expired() {
                    tracing::warn!(remote, "heartbeat timed out; dropping connection");
                    break;
                }
                if connection.outbound.send(OutboundFrame::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            _ = &mut write_task => {
                tracing::debug!(remote, "writer task ended");
                break;
            }
        }
    }

    connection.shutdown();
    state.registry.deregister(&remote);
    write_task.abort();
    tracing::info!(remote, "device disconnected");
}

/// Per-connection session state
struct Connection {
    state: Arc<GatewayState>,
    remote: String,
    outbound: mpsc::Sender<OutboundFrame>,
    is_recording: bool,
    session: Option<RecordingSession>,
    job: Option<JoinHandle<()>>,
    last_pong: Instant,
}

impl Connection {
    fn new(state: Arc<GatewayState>, remote: String, outbound: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            state,
            remote,
            outbound,
            is_recording: false,
            session: None,
            job: None,
            last_pong: Instant::now(),
        }
    }

    /// Dispatch one inbound message; returns `false` when the connection
    /// should be torn down
    fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Text(text) => self.handle_control(text.as_str()),
            Message::Binary(data) => self.handle_audio(&data),
            Message::Pong(_) => self.last_pong = Instant::now(),
            Message::Ping(_) => {
                // tungstenite answers pings on our behalf
            }
            Message::Close(frame) => {
                tracing::info!(remote = %self.remote, ?frame, "close frame received");
                return false;
            }
        }
        true
    }

    fn handle_control(&mut self, token: &str) {
        match token {
            START_RECORDING => self.on_start(),
            STOP_RECORDING => self.on_stop(true),
            STOP_RECORDING_ERROR => self.on_stop(false),
            other => {
                tracing::debug!(remote = %self.remote, token = other, "ignoring unrecognized control frame");
            }
        }
    }

    /// Open a recording session; a fresh utterance supersedes whatever the
    /// previous job is still doing
    fn on_start(&mut self) {
        if self.session.is_some() {
            tracing::warn!(remote = %self.remote, "start while already recording; ignoring");
            return;
        }

        if let Some(job) = self.job.take() {
            if job.is_finished() {
                tracing::debug!(remote = %self.remote, "previous job already finished");
            } else {
                tracing::info!(remote = %self.remote, "cancelling superseded job");
                job.abort();
            }
        }

        self.is_recording = true;
        match RecordingSession::create(
            &self.state.config.capture_dir,
            &self.remote,
            &self.state.config.device,
        ) {
            Ok(session) => {
                tracing::info!(
                    remote = %self.remote,
                    path = %session.path().display(),
                    "recording started"
                );
                self.session = Some(session);
            }
            Err(e) => {
                tracing::error!(remote = %self.remote, error = %e, "failed to open capture file");
                self.session = None;
            }
        }
    }

    /// Close the open session; `process` selects the normal-stop path that
    /// hands the capture to the pipeline
    fn on_stop(&mut self, process: bool) {
        if !self.is_recording && self.session.is_none() {
            tracing::info!(remote = %self.remote, "stop without active recording; ignoring");
            return;
        }
        self.is_recording = false;

        let Some(session) = self.session.take() else {
            tracing::debug!(remote = %self.remote, "stop for a session that never opened");
            return;
        };

        match session.finalize() {
            Ok((path, bytes)) => {
                tracing::info!(
                    remote = %self.remote,
                    path = %path.display(),
                    bytes,
                    "recording finished"
                );
                if process {
                    self.spawn_job(path);
                }
            }
            Err(e) => {
                tracing::error!(remote = %self.remote, error = %e, "failed to finalize capture file");
            }
        }
    }

    /// Append one binary frame to the open session
    fn handle_audio(&mut self, frame: &[u8]) {
        if !self.is_recording {
            tracing::trace!(remote = %self.remote, len = frame.len(), "binary frame outside recording; ignoring");
            return;
        }

        let Some(session) = self.session.as_mut() else {
            tracing::warn!(
                remote = %self.remote,
                len = frame.len(),
                "dropping audio frame: recording flagged but no capture open"
            );
            return;
        };

        if let Err(e) = session.append(frame) {
            tracing::error!(remote = %self.remote, error = %e, "capture write failed; closing session");
            if let Some(failed) = self.session.take() {
                if let Err(e) = failed.finalize() {
                    tracing::debug!(remote = %self.remote, error = %e, "finalize after write failure failed too");
                }
            }
            self.is_recording = false;
        }
    }

    /// Launch the supervised pipeline → relay job for a finalized capture
    fn spawn_job(&mut self, capture_path: PathBuf) {
        let state = self.state.clone();
        let remote = self.remote.clone();
        let outbound = self.outbound.clone();

        let handle = tokio::spawn(async move {
            // Deletes the capture on every exit path, cancellation included.
            let _capture = CaptureFileGuard::new(capture_path.clone());

            let reply = match pipeline::run(&state.config.pipeline.command, &capture_path).await {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    tracing::info!(remote, "pipeline produced no reply; skipping synthesis");
                    return;
                }
                Err(e) => {
                    tracing::error!(remote, error = %e, "pipeline invocation failed");
                    return;
                }
            };

            relay::stream_reply(
                state.synth.as_ref(),
                &reply,
                &remote,
                state.config.device,
                state.config.pacing_multiplier,
                &outbound,
            )
            .await;
        });

        self.job = Some(handle);
    }

    /// Whether the peer's pong is overdue past the grace period
    fn heartbeat_expired(&self) -> bool {
        self.last_pong.elapsed()
            > self.state.config.server.ping_interval + self.state.config.server.ping_timeout
    }

    /// Unconditional disconnect cleanup
    fn shutdown(&mut self) {
        if let Some(job) = self.job.take() {
            if !job.is_finished() {
                tracing::info!(remote = %self.remote, "cancelling job for disconnected device");
                job.abort();
            }
        }

        if let Some(session) = self.session.take() {
            tracing::info!(
                remote = %self.remote,
                path = %session.path().display(),
                "closing capture for disconnected device"
            );
            if let Err(e) = session.finalize() {
                tracing::warn!(remote = %self.remote, error = %e, "failed to finalize capture on disconnect");
            }
        }
        self.is_recording = false;
    }
}
