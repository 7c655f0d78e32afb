//! Stream overlay (§4.10): a small `axum` server exposing a `/events` SSE
//! stream of skill-progress snapshots, decisions, and team-bulletin
//! snapshots for a browser overlay to render. Grounded on the teacher's
//! `SseMakeWriter`/`SseWriter` broadcast-channel pattern (`logging.rs`) —
//! the same "one broadcast channel, many best-effort subscribers" shape,
//! here carrying structured JSON events instead of log lines.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::core::event::TelemetryEvent;
use crate::core::skills::ProgressSnapshot;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayEvent {
    Decision(TelemetryEvent),
    Progress(ProgressSnapshot),
    Bulletin { text: String },
}

#[derive(Clone)]
pub struct OverlayHub {
    tx: broadcast::Sender<OverlayEvent>,
    logs: broadcast::Sender<String>,
}

impl OverlayHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        let (logs, _logs_rx) = broadcast::channel(256);
        Self { tx, logs }
    }

    /// Replaces the default (unwired) log channel with the one the tracing
    /// subscriber is actually writing to, so `/logs` streams real output.
    pub fn with_logs(mut self, logs: broadcast::Sender<String>) -> Self {
        self.logs = logs;
        self
    }

    pub fn publish(&self, event: OverlayEvent) {
        // No receivers connected is the common case; never an error worth logging.
        let _ = self.tx.send(event);
    }

    /// Spawns a task forwarding every decision telemetry event onto the hub.
    pub fn forward_telemetry(&self, mut rx: tokio::sync::mpsc::UnboundedReceiver<TelemetryEvent>) {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                hub.publish(OverlayEvent::Decision(event));
            }
        });
    }

    /// Spawns a task forwarding every skill-progress snapshot onto the hub.
    pub fn forward_progress(&self, mut rx: tokio::sync::mpsc::UnboundedReceiver<ProgressSnapshot>) {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                hub.publish(OverlayEvent::Progress(snapshot));
            }
        });
    }

    /// Spawns a task periodically publishing a bulletin-wide snapshot.
    pub fn poll_bulletin(&self, bulletin: crate::core::bulletin::TeamBulletin, interval: std::time::Duration) {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let text = bulletin.snapshot_all().await;
                hub.publish(OverlayEvent::Bulletin { text });
            }
        });
    }

    /// Binds and serves the SSE endpoint, returning once the listener fails
    /// to bind. Intended to be spawned as a background task.
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/events", get(events_handler))
            .route("/logs", get(logs_handler))
            .layer(Extension(self.clone()))
            .layer(CorsLayer::permissive());

        info!("overlay server listening on {addr}");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

impl Default for OverlayHub {
    fn default() -> Self {
        Self::new()
    }
}

async fn events_handler(Extension(hub): Extension<OverlayHub>) -> impl IntoResponse {
    let stream = BroadcastStream::new(hub.tx.subscribe()).filter_map(|msg| match msg {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok::<_, Infallible>(SseEvent::default().data(json))),
            Err(e) => {
                error!("failed to serialise overlay event: {e}");
                None
            }
        },
        Err(_lagged) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn logs_handler(Extension(hub): Extension<OverlayHub>) -> impl IntoResponse {
    let stream = BroadcastStream::new(hub.logs.subscribe()).filter_map(|msg| match msg {
        Ok(line) => Some(Ok::<_, Infallible>(SseEvent::default().data(line))),
        Err(_lagged) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
