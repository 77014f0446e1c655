//! WebSocket endpoint wiring sessions to the message router.
//!
//! Each accepted socket is split into a writer task fed by an mpsc channel
//! and a read loop that decodes frames and hands them to the router. The
//! channel is what lets handlers and background loops send to the session
//! without holding the socket.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::errors::HostlinkError;
use crate::gateway::codec::MessageCodec;
use crate::gateway::router::MessageRouter;
use crate::gateway::session::{Connection, GatewaySession, SessionManager};

/// Shared state for the gateway endpoint.
#[derive(Clone)]
pub struct GatewayState {
    pub sessions: Arc<SessionManager>,
    pub router: Arc<MessageRouter>,
    pub codec: MessageCodec,
}

/// Router exposing the WebSocket upgrade endpoint.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/gateway", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum Outbound {
    Text(String),
    Close(u16, String),
}

/// Connection backed by the writer channel.
struct WsConnection {
    tx: mpsc::Sender<Outbound>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&self, text: String) -> Result<(), HostlinkError> {
        if self.tx.send(Outbound::Text(text)).await.is_err() {
            // Writer already gone; the read loop will clean the session up.
            tracing::debug!("send on closed connection channel");
        }
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) {
        let _ = self
            .tx
            .send(Outbound::Close(code, reason.to_string()))
            .await;
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(64);

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close(code, reason) => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: Cow::Owned(reason),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let session = Arc::new(GatewaySession::new(Arc::new(WsConnection { tx })));
    let session_id = session.id().to_string();
    state.sessions.add(session.clone());
    tracing::info!(session_id = %session_id, "gateway connected");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(session_id = %session_id, error = %err, "socket read error");
                break;
            }
        };

        match message {
            Message::Text(raw) => match state.codec.decode(&raw) {
                Ok(frame) => state.router.route(session.clone(), frame),
                Err(err) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %err,
                        "dropping undecodable frame"
                    );
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => session.touch(),
            Message::Binary(_) => {
                tracing::warn!(session_id = %session_id, "ignoring binary frame");
            }
        }
    }

    state.sessions.remove(&session_id);
    writer.abort();
    tracing::info!(session_id = %session_id, "gateway disconnected");
}
