use crate::{
    distribution::DistributionHandle,
    error::AppError,
    media::MediaItem,
    protocol::ClientMessage,
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Request, State, WebSocketUpgrade,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub async fn root_handler(State(state): State<AppState>) -> String {
    state.config.server.name.clone()
}

/// Current ordered media list. Empty when nothing has been synced yet.
pub async fn all_media(State(state): State<AppState>) -> Json<Vec<MediaItem>> {
    Json(state.playlist.all().items.clone())
}

/// Reachability probe used by displays before they open the push channel
pub async fn server_status(State(state): State<AppState>) -> Result<&'static str, AppError> {
    if state.synchronizer.is_initialized() && state.playlist.is_running() {
        Ok("OK")
    } else {
        Err(AppError::Unavailable)
    }
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}

/// Every API request counts as client activity
pub async fn track_activity(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.power.handle_client_activity();
    next.run(request).await
}

pub async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

enum WriterExit {
    /// The hub dropped the connection's queue
    Released,
    /// Writing to the socket failed
    Failed(String),
}

/// Drive one push channel connection. Outbound frames come from the hub
/// through a bounded queue; inbound frames are forwarded back to it.
async fn serve_socket(socket: WebSocket, state: AppState) {
    let hub: &DistributionHandle = &state.distribution;
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut queue) = mpsc::channel(hub.outbound_capacity());

    let Some(id) = hub.register(outbound) else {
        warn!("Push channel rejected: distribution layer is not running");
        return;
    };

    let mut writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if let Err(e) = sink.send(Message::Text(text)).await {
                return WriterExit::Failed(e.to_string());
            }
        }
        let _ = sink.send(Message::Close(None)).await;
        WriterExit::Released
    });

    loop {
        tokio::select! {
            exit = &mut writer => {
                match exit {
                    Ok(WriterExit::Failed(reason)) => hub.fault(id, reason),
                    Ok(WriterExit::Released) => debug!("Connection {} released by hub", id),
                    Err(e) => hub.fault(id, e.to_string()),
                }
                return;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    state.power.handle_client_activity();
                    let message = serde_json::from_str::<ClientMessage>(text.as_str()).unwrap_or_else(|e| {
                        debug!("Unparseable frame from {}: {}", id, e);
                        ClientMessage::Unknown
                    });
                    hub.inbound(id, message);
                }
                Some(Ok(Message::Close(_))) | None => {
                    hub.closed(id);
                    break;
                }
                Some(Ok(_)) => {
                    // binary and transport-level ping/pong still prove liveness
                    state.power.handle_client_activity();
                    hub.inbound(id, ClientMessage::Unknown);
                }
                Some(Err(e)) => {
                    hub.fault(id, e.to_string());
                    break;
                }
            }
        }
    }

    writer.abort();
}
