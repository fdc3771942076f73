use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::borrow::Cow;
use uuid::Uuid;

use crate::message::ServerEvent;

/// Identity could not be resolved at connect time. Distinct from
/// `CLOSE_FORBIDDEN` so clients can tell "log in again" from "you are not a
/// member of this conversation".
pub const CLOSE_UNAUTHENTICATED: u16 = 4401;
pub const CLOSE_FORBIDDEN: u16 = 4403;
/// Standard "internal error" close code, used when the membership check
/// itself fails.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Lifecycle of a conversation socket. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Joined,
    Closed,
}

pub struct ConnectionHandler {
    sink: SplitSink<WebSocket, WsMessage>,
    user_id: Option<Uuid>,
    state: ConnectionState,
}

impl ConnectionHandler {
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            sink,
            user_id: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn authenticate(&mut self, user_id: Uuid) {
        self.user_id = Some(user_id);
        self.state = ConnectionState::Authenticated;
    }

    pub fn mark_joined(&mut self) {
        self.state = ConnectionState::Joined;
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub async fn send_event(&mut self, event: &ServerEvent) -> Result<(), axum::Error> {
        let json = serde_json::to_string(event)
            .map_err(|e| axum::Error::new(e))?;
        self.sink.send(WsMessage::Text(json)).await
    }

    pub async fn send_error(&mut self, code: &str, message: &str) {
        let event = ServerEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        };
        if self.send_event(&event).await.is_err() {
            tracing::debug!("Failed to send error to disconnected client");
        }
    }

    pub async fn pong(&mut self, data: Vec<u8>) {
        let _ = self.sink.send(WsMessage::Pong(data)).await;
    }

    /// Sends a close frame and marks the connection closed. Errors are
    /// ignored; the peer may already be gone.
    pub async fn close_with(&mut self, code: u16, reason: &'static str) {
        let _ = self
            .sink
            .send(WsMessage::Close(Some(CloseFrame {
                code,
                reason: Cow::Borrowed(reason),
            })))
            .await;
        self.state = ConnectionState::Closed;
    }
}
