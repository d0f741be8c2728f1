use crate::broadcast::ProgressBroadcaster;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Shared state for the subscriber stream endpoint.
#[derive(Clone)]
pub struct WsState {
    pub broadcaster: Arc<ProgressBroadcaster>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    /// Optional initial job filter; without it the subscriber sees every
    /// job's events.
    pub job_id: Option<String>,
}

/// Frames accepted from subscribers.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ping,
    Subscribe { job_id: Option<String> },
}

/// Routes for the progress subscriber stream.
pub fn routes(broadcaster: Arc<ProgressBroadcaster>) -> Router {
    Router::new()
        .route("/ws/progress", get(ws_handler))
        .with_state(WsState { broadcaster })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SubscribeParams>,
    State(state): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.broadcaster, params.job_id))
}

/// Bridge one subscriber to the broadcaster.
///
/// The receive half handles ping and subscribe frames; the send half pushes
/// job snapshots as they arrive. Lagged events are simply skipped - the
/// subscriber was too slow and the drop-oldest policy already discarded
/// them.
async fn handle_socket(
    mut socket: WebSocket,
    broadcaster: Arc<ProgressBroadcaster>,
    initial_filter: Option<String>,
) {
    let mut rx = broadcaster.subscribe();
    let mut filter = initial_filter;
    info!(filter = ?filter, "Progress subscriber connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Ping) => {
                                let pong = json!({ "type": "pong" }).to_string();
                                if socket.send(Message::Text(pong)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientFrame::Subscribe { job_id }) => {
                                debug!(job_id = ?job_id, "Subscriber narrowed filter");
                                filter = job_id;
                            }
                            Err(e) => {
                                warn!("Ignoring malformed subscriber frame: {}", e);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Subscriber socket error: {}", e);
                        break;
                    }
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let matches = filter
                            .as_deref()
                            .map(|job_id| job_id == event.job_id)
                            .unwrap_or(true);
                        if !matches {
                            continue;
                        }
                        let frame = event.to_frame().to_string();
                        if socket.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Subscriber lagged, oldest events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("Progress subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_deserialize() {
        assert!(matches!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"ping"}"#).unwrap(),
            ClientFrame::Ping
        ));
        match serde_json::from_str::<ClientFrame>(r#"{"type":"subscribe","job_id":"j1"}"#).unwrap()
        {
            ClientFrame::Subscribe { job_id } => assert_eq!(job_id.as_deref(), Some("j1")),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn unknown_frame_types_are_rejected() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"reset_all"}"#).is_err());
    }
}
