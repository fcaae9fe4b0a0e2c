//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::Response;

use super::connection::run_connection;
use crate::app_state::AppState;

/// Query parameter carrying the bearer access token.
const TOKEN_PARAM: &str = "token";

/// `GET /ws?token=JWT`: Upgrade to the real-time channel.
///
/// The credential is checked before upgrading. On failure the connection
/// is still upgraded and then immediately closed with 1008 and a short
/// reason, which is what browser clients can observe. The query string is
/// read leniently so that a malformed one is an authentication failure
/// rather than an HTTP 400.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    State(state): State<AppState>,
) -> Response {
    let token = handshake_token(query.as_deref());
    match state.hub.authenticate(token.as_deref()) {
        Ok(claims) => {
            let hub = Arc::clone(&state.hub);
            ws.on_upgrade(move |socket| async move {
                let admission = hub.admit(&claims);
                run_connection(socket, hub, admission.connection, admission.outbound).await;
            })
        }
        Err(err) => {
            tracing::warn!(
                reason = err.close_reason(),
                "websocket connection rejected"
            );
            ws.on_upgrade(move |mut socket| async move {
                let frame = CloseFrame {
                    code: err.close_code(),
                    reason: err.close_reason().into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
            })
        }
    }
}

/// First non-empty `token` value in the query, if any.
fn handshake_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, value)| key == TOKEN_PARAM && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}
