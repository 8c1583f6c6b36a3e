//! Device-facing gateway server
//!
//! One axum router carries the device WebSocket endpoint and the
//! health/status probes. The connection registry is owned by the server
//! instance and shared with handlers through [`GatewayState`] — there is no
//! process-wide singleton.

pub mod health;
pub mod websocket;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::synth::{HttpSynthesizer, SpeechSynthesizer};
use crate::Result;

/// Per-server table of live device connections
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, Instant>>,
}

impl ConnectionRegistry {
    /// Record a newly accepted connection
    pub fn register(&self, remote: &str) {
        if let Ok(mut connections) = self.inner.lock() {
            connections.insert(remote.to_string(), Instant::now());
        }
    }

    /// Forget a connection; safe to call for unknown ids
    pub fn deregister(&self, remote: &str) {
        if let Ok(mut connections) = self.inner.lock() {
            connections.remove(remote);
        }
    }

    /// Number of live connections
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether any device is connected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared state for connection handlers
pub struct GatewayState {
    /// Validated gateway configuration
    pub config: Config,

    /// Speech-synthesis backend
    pub synth: Arc<dyn SpeechSynthesizer>,

    /// Live connection table
    pub registry: ConnectionRegistry,
}

/// The device-facing gateway server
pub struct GatewayServer {
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Build a server with the HTTP synthesis backend from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the synthesis client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        let synth = Arc::new(HttpSynthesizer::new(&config.synthesis)?);
        Ok(Self::with_synthesizer(config, synth))
    }

    /// Build a server with an explicit synthesis backend
    #[must_use]
    pub fn with_synthesizer(config: Config, synth: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            state: Arc::new(GatewayState {
                config,
                synth,
                registry: ConnectionRegistry::default(),
            }),
        }
    }

    /// Assemble the router
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(websocket::router(self.state.clone()))
            .merge(health::router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until the process exits.
    ///
    /// # Errors
    ///
    /// Returns error if the listen address cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        );
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind {addr}: {e}")))?;

        tracing::info!(
            addr = %addr,
            device_rate = self.state.config.device.sample_rate,
            capture_dir = %self.state.config.capture_dir.display(),
            "gateway listening"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| crate::Error::Connection(format!("server error: {e}")))?;

        Ok(())
    }
}
