//! Persistent chat connections over WebSocket

use async_trait::async_trait;
use axum::{
    Extension,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt, future, stream::SplitSink};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{AppState, origin_allowed};
use crate::error::{ApiError, ClientDisconnect};
use crate::relay::{FragmentSink, Inbound, correlate, drive_connection};
use crate::session::CorrelationToken;

#[async_trait]
impl FragmentSink for SplitSink<WebSocket, Message> {
    async fn send_fragment(&mut self, text: String) -> Result<(), ClientDisconnect> {
        self.send(Message::Text(text.into()))
            .await
            .map_err(|e| ClientDisconnect(e.to_string()))
    }
}

/// Handle `GET /ws`
///
/// Rejects disallowed origins before upgrading, then correlates the new
/// connection with any context uploaded under the same token.
pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(token): Extension<CorrelationToken>,
    headers: HeaderMap,
) -> Response {
    if !origin_allowed(&headers, &state.config.server.allowed_origins) {
        let origin = headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("<invalid>");
        tracing::warn!(origin, "Rejected WebSocket handshake from disallowed origin");
        return ApiError::Forbidden {
            error_type: "origin_not_allowed",
            message: format!("Origin '{origin}' is not allowed"),
        }
        .into_response();
    }

    let connection = correlate(&state.store, &token);
    let generator = state.generator.clone();
    let relay_config = state.config.relay.clone();

    ws.on_upgrade(move |socket| async move {
        tracing::info!(token = %token, "WebSocket connection established");

        let (sender, receiver) = socket.split();
        let inbound = receiver.filter_map(|message| future::ready(to_inbound(message)));

        let state = drive_connection(
            inbound,
            Arc::new(Mutex::new(sender)),
            generator,
            connection,
            relay_config,
        )
        .await;

        tracing::info!(token = %token, phase = ?state.phase(), "WebSocket connection closed");
    })
}

/// Map a socket read to a relay event; control frames other than close are skipped
fn to_inbound(message: Result<Message, axum::Error>) -> Option<Inbound> {
    match message {
        Ok(Message::Text(text)) => Some(Inbound::Text(text.to_string())),
        Ok(Message::Close(_)) => Some(Inbound::Close),
        Ok(Message::Binary(_)) => {
            tracing::debug!("Ignoring binary frame");
            None
        }
        Ok(Message::Ping(_) | Message::Pong(_)) => None,
        Err(e) => {
            tracing::debug!("WebSocket read error: {e}");
            Some(Inbound::Close)
        }
    }
}
