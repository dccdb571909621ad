use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use log::{info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::controller::SessionState;
use crate::live_status::LiveStatus;
use crate::status_store::StatusStore;

#[derive(Clone)]
pub struct DashboardState {
    pub store: Arc<StatusStore>,
    pub session: watch::Receiver<SessionState>,
}

impl DashboardState {
    fn live_status(&self) -> LiveStatus {
        LiveStatus::new(&self.store.snapshot(), *self.session.borrow())
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_dashboard(state: DashboardState, port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(target: "dashboard", "Status dashboard at http://{}", addr);
    axum::serve(listener, router(state)).await
}

async fn status_handler(State(state): State<DashboardState>) -> Json<LiveStatus> {
    Json(state.live_status())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Push the current status, then one message per store update, until the
/// client goes away
async fn handle_socket(socket: WebSocket, state: DashboardState) {
    let (mut sender, mut receiver) = socket.split();
    let mut updates = state.store.subscribe_update_count();
    let mut tracking = state.store.subscribe_tracking();

    let mut push = tokio::spawn(async move {
        loop {
            let json = match serde_json::to_string(&state.live_status()) {
                Ok(json) => json,
                Err(err) => {
                    warn!(target: "dashboard", "Failed to serialise status: {}", err);
                    break;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }

            tokio::select! {
                changed = updates.changed() => if changed.is_err() { break },
                changed = tracking.changed() => if changed.is_err() { break },
            }
            updates.borrow_and_update();
            tracking.borrow_and_update();
        }
    });

    let mut drain = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut push => drain.abort(),
        _ = &mut drain => push.abort(),
    }
}
