//! HTTP surface of the arena.
//!
//! - `GET /ws` - websocket upgrade, the connection then receives INIT/UPDATE frames
//! - `GET /health` - liveness plus a few counters
//! - `GET /api/state` - the current state, shaped like an INIT frame
//!
//! Viewers never send anything meaningful: incoming text is ignored and a close frame
//! (or a socket error) ends the connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::broadcast::protocol::Frame;
use crate::broadcast::BroadcastHub;
use crate::game_state::Phase;
use crate::state_store::StateStore;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub hub: Arc<BroadcastHub>,
    pub started: Instant,
}

/// Router serving viewers and the read-only endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/state", get(current_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub phase: Phase,
    pub time_left: u64,
    pub version: u64,
    pub agents: usize,
    pub viewers: usize,
    pub uptime_secs: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (phase, time_left) = state.store.phase();
    Json(HealthResponse {
        status: "healthy",
        phase,
        time_left,
        version: state.store.version(),
        agents: state.store.agents().len(),
        viewers: state.hub.viewer_count(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn current_state(State(state): State<AppState>) -> Json<Frame> {
    Json(Frame::init(state.store.snapshot()))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let mut viewer = hub.connect();
    let id = viewer.id();
    debug!(viewer = id, "websocket opened");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = viewer.next_frame().await {
            let json = match frame.to_json() {
                Ok(json) => json,
                Err(e) => {
                    warn!(viewer = id, error = %e, "could not serialize frame");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                // client went away
                return;
            }
        }
        // hub shut down
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(viewer = id, error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    debug!(viewer = id, "websocket closed");
}
