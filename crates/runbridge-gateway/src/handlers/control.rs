//! The provider control channel.
//!
//! A provider keeps exactly one WebSocket open per session. This handler
//! validates the session, registers a [`runbridge_tunnel::ControlChannel`]
//! for it, and pumps frames both ways until the socket drops — at which
//! point every piece of tunnel state scoped to the channel dies with it.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use runbridge_core::SessionId;
use runbridge_lease::LeaseControl;
use runbridge_store::SessionState;
use runbridge_tunnel::{Envelope, Frame};

use crate::error::ApiError;
use crate::state::GatewayState;

/// Accept a provider control-channel connection.
///
/// # Errors
///
/// 404 when the session is unknown or terminated (the provider should
/// register a fresh session before connecting).
pub async fn control_channel<L>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState<L>>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError>
where
    L: LeaseControl + 'static,
{
    let session_id: SessionId = session_id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid session ID: {session_id}")))?;

    let session = state.lease.session_status(&session_id).await?;
    if session.status == SessionState::Terminated {
        return Err(ApiError::NotFound(format!("session {session_id}")));
    }

    Ok(ws.on_upgrade(move |socket| run_control_channel(state, session_id, socket)))
}

/// Pump the control channel until the provider disconnects.
async fn run_control_channel<L>(
    state: Arc<GatewayState<L>>,
    session_id: SessionId,
    socket: WebSocket,
) where
    L: LeaseControl + 'static,
{
    let (channel, mut outbound) = state.tunnel.register(session_id);
    tracing::info!(session_id = %session_id, "provider control channel connected");

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text),
                Frame::Binary(bytes) => Message::Binary(bytes),
                Frame::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match Envelope::decode(&text) {
                Ok(envelope) => channel.handle_envelope(envelope),
                Err(error) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %error,
                        "undecodable envelope from provider, dropped"
                    );
                }
            },
            Ok(Message::Binary(_)) => {
                tracing::warn!(
                    session_id = %session_id,
                    "unexpected binary frame from provider, dropped"
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(error) => {
                tracing::debug!(
                    session_id = %session_id,
                    error = %error,
                    "control channel read error"
                );
                break;
            }
        }
    }

    writer.abort();
    // Completes every pending request with an error and closes every
    // bridged stream scoped to this channel.
    state.tunnel.deregister(&session_id, &channel);
    tracing::info!(session_id = %session_id, "provider control channel disconnected");
}
