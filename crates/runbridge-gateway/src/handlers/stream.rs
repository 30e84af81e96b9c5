//! Stream-channel tunnel: proxied WebSocket streams.
//!
//! A renter opens a WebSocket against a named path on the provider side;
//! the relay bridges it onto the session's control channel under a fresh
//! stream id. Either side closing tears the bridge down symmetrically.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use runbridge_core::SessionId;
use runbridge_lease::LeaseControl;
use runbridge_store::SessionState;
use runbridge_tunnel::{ControlChannel, StreamFrame, TunnelError};

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::state::GatewayState;

/// Accept a proxied stream connection.
///
/// Lease and channel checks run before the upgrade so failures surface as
/// ordinary HTTP statuses.
///
/// # Errors
///
/// 503 when the session is not leased to the caller or the provider channel
/// is absent.
pub async fn proxy_stream<L>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState<L>>>,
    AuthPrincipal(principal): AuthPrincipal,
    Path((session_id, path)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
    L: LeaseControl + 'static,
{
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {session_id}")))?;

    let session = state.lease.session_status(&session_id).await?;
    if session.status != SessionState::Locked || session.locked_by.as_ref() != Some(&principal) {
        return Err(ApiError::ServiceUnavailable(
            "session is not leased to the caller".to_string(),
        ));
    }

    let channel = state
        .tunnel
        .get(&session_id)
        .ok_or(TunnelError::ChannelAbsent)?;

    Ok(ws.on_upgrade(move |socket| run_stream(channel, path, socket)))
}

/// Bridge one renter socket onto the control channel.
async fn run_stream(channel: Arc<ControlChannel>, path: String, mut socket: WebSocket) {
    let (renter_tx, mut renter_rx) = mpsc::unbounded_channel();
    let stream_id = match channel.open_stream(&path, renter_tx) {
        Ok(id) => id,
        Err(error) => {
            tracing::warn!(error = %error, path = %path, "stream open failed");
            let _ = socket.close().await;
            return;
        }
    };

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            // Provider → renter.
            frame = renter_rx.recv() => match frame {
                Some(StreamFrame::Text(text)) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(StreamFrame::Binary(bytes)) => {
                    if sink.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                // Provider closed the stream (or the channel went away):
                // close the renter socket; the route is already gone.
                Some(StreamFrame::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            // Renter → provider.
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if channel.stream_send(stream_id, StreamFrame::Text(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => {
                    if channel.stream_send(stream_id, StreamFrame::Binary(bytes)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(error)) => {
                    tracing::debug!(stream_id = %stream_id, error = %error, "renter socket error");
                    break;
                }
            },
        }
    }

    // Renter side ended: notify the provider and drop the route.
    let _ = channel.close_stream_from_renter(stream_id);
}
