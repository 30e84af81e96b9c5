//! One provider control channel and the relay state scoped to it.
//!
//! The gateway owns the WebSocket; this type owns everything keyed to it:
//! the outbound frame queue, the pending-request table, and the stream-route
//! table. All three die together when the channel closes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use runbridge_core::{RequestId, SessionId, StreamId};

use crate::error::{ProtocolError, Result, TunnelError};
use crate::protocol::Envelope;

/// One outbound message for the provider socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON envelope.
    Text(String),
    /// Raw bytes (the body of a proxied request).
    Binary(Vec<u8>),
    /// The channel shut down; the socket should be closed.
    Close,
}

/// One message for a bridged renter socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// The other side closed; the renter socket should be closed too.
    Close,
}

/// A proxied HTTP call, ready to forward.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    /// HTTP method.
    pub method: String,
    /// Path (plus query) on the provider's runtime.
    pub path: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

/// The provider's answer to a proxied HTTP call.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

struct ResponseHead {
    status: u16,
    headers: HashMap<String, String>,
}

/// Bookkeeping for one in-flight proxied call. Registered before the
/// envelope is sent so a fast response can never race the table entry.
struct PendingRequest {
    responder: oneshot::Sender<ProxiedResponse>,
    head: Option<ResponseHead>,
    created_at: Instant,
}

struct StreamRoute {
    renter: mpsc::UnboundedSender<StreamFrame>,
    path: String,
}

/// The relay side of one provider control channel.
pub struct ControlChannel {
    session_id: SessionId,
    outbound: mpsc::UnboundedSender<Frame>,
    pending: DashMap<RequestId, PendingRequest>,
    streams: DashMap<StreamId, StreamRoute>,
    closed: AtomicBool,
}

impl ControlChannel {
    /// Create a channel and the receiver the gateway pumps into the socket.
    #[must_use]
    pub fn new(session_id: SessionId) -> (Arc<Self>, mpsc::UnboundedReceiver<Frame>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(Self {
            session_id,
            outbound,
            pending: DashMap::new(),
            streams: DashMap::new(),
            closed: AtomicBool::new(false),
        });
        (channel, rx)
    }

    /// The session this channel belongs to.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// True once [`ControlChannel::shutdown`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn send_frame(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(TunnelError::ChannelClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TunnelError::ChannelClosed)
    }

    fn send_envelope(&self, envelope: &Envelope) -> Result<()> {
        self.send_frame(Frame::Text(envelope.encode()?))
    }

    // =========================================================================
    // Request channel
    // =========================================================================

    /// Forward one HTTP call over the control channel and wait for the
    /// provider's answer.
    ///
    /// Blocks the caller until the correlated `http-response`/`http-body`
    /// pair arrives, the channel closes, or `timeout` elapses — stalled
    /// calls never hang forever.
    ///
    /// # Errors
    ///
    /// `ChannelClosed` if the channel is (or becomes) closed, `Timeout` if
    /// the provider never answers.
    pub async fn proxy_request(
        &self,
        request: ProxiedRequest,
        timeout: Duration,
    ) -> Result<ProxiedResponse> {
        if self.is_closed() {
            return Err(TunnelError::ChannelClosed);
        }

        let request_id = RequestId::generate();
        let (responder, receiver) = oneshot::channel();
        self.pending.insert(
            request_id,
            PendingRequest {
                responder,
                head: None,
                created_at: Instant::now(),
            },
        );

        let head = Envelope::HttpRequest {
            request_id,
            method: request.method,
            path: request.path,
            headers: request.headers,
        };
        let body_frame = match request.body {
            Some(bytes) if !bytes.is_empty() => Frame::Binary(bytes),
            _ => Frame::Text(Envelope::HttpBodyEmpty { request_id }.encode()?),
        };

        if let Err(error) = self
            .send_envelope(&head)
            .and_then(|()| self.send_frame(body_frame))
        {
            self.pending.remove(&request_id);
            return Err(error);
        }

        tracing::debug!(
            session_id = %self.session_id,
            request_id = %request_id,
            "proxied request forwarded"
        );

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(response)) => Ok(response),
            // The pending entry was dropped: channel shutdown or lease end.
            Ok(Err(_)) => Err(TunnelError::ChannelClosed),
            Err(_) => {
                if let Some((_, entry)) = self.pending.remove(&request_id) {
                    tracing::warn!(
                        session_id = %self.session_id,
                        request_id = %request_id,
                        waited_ms = entry.created_at.elapsed().as_millis(),
                        "proxied request timed out"
                    );
                }
                Err(TunnelError::Timeout)
            }
        }
    }

    // =========================================================================
    // Stream channel
    // =========================================================================

    /// Open a stream to `path` on the provider side, routing return frames
    /// into `renter`.
    ///
    /// # Errors
    ///
    /// `ChannelClosed` if the control channel is gone.
    pub fn open_stream(
        &self,
        path: &str,
        renter: mpsc::UnboundedSender<StreamFrame>,
    ) -> Result<StreamId> {
        if self.is_closed() {
            return Err(TunnelError::ChannelClosed);
        }

        let stream_id = StreamId::generate();
        self.streams.insert(
            stream_id,
            StreamRoute {
                renter,
                path: path.to_string(),
            },
        );

        let open = Envelope::StreamOpen {
            stream_id,
            path: path.to_string(),
        };
        if let Err(error) = self.send_envelope(&open) {
            self.streams.remove(&stream_id);
            return Err(error);
        }

        tracing::debug!(
            session_id = %self.session_id,
            stream_id = %stream_id,
            path = %path,
            "stream opened"
        );
        Ok(stream_id)
    }

    /// Forward one renter frame to the provider.
    ///
    /// A `Close` frame notifies the provider and removes the route.
    ///
    /// # Errors
    ///
    /// `StreamNotFound` if the route is gone, `ChannelClosed` if the control
    /// channel is gone.
    pub fn stream_send(&self, stream_id: StreamId, frame: StreamFrame) -> Result<()> {
        let envelope = match frame {
            StreamFrame::Text(payload) => Envelope::StreamData { stream_id, payload },
            StreamFrame::Binary(bytes) => Envelope::StreamDataBinary {
                stream_id,
                payload: BASE64.encode(bytes),
            },
            StreamFrame::Close => return self.close_stream_from_renter(stream_id),
        };

        if !self.streams.contains_key(&stream_id) {
            return Err(TunnelError::StreamNotFound(stream_id));
        }
        self.send_envelope(&envelope)
    }

    /// The renter went away: tell the provider and drop the route.
    ///
    /// # Errors
    ///
    /// `StreamNotFound` if the route was already gone.
    pub fn close_stream_from_renter(&self, stream_id: StreamId) -> Result<()> {
        let Some((_, _route)) = self.streams.remove(&stream_id) else {
            return Err(TunnelError::StreamNotFound(stream_id));
        };
        tracing::debug!(
            session_id = %self.session_id,
            stream_id = %stream_id,
            "stream closed by renter"
        );
        // The channel may already be gone; the route removal is what matters.
        let _ = self.send_envelope(&Envelope::StreamClose { stream_id });
        Ok(())
    }

    // =========================================================================
    // Provider → relay dispatch
    // =========================================================================

    /// Dispatch one envelope received from the provider.
    ///
    /// Routing is strictly by correlation id. Responses for unknown ids are
    /// logged and dropped (retransmission or a request that already timed
    /// out); so are frames for unknown streams.
    pub fn handle_envelope(&self, envelope: Envelope) {
        match envelope {
            Envelope::HttpResponse {
                request_id,
                status,
                headers,
            } => match self.pending.get_mut(&request_id) {
                Some(mut entry) => {
                    entry.head = Some(ResponseHead { status, headers });
                }
                None => {
                    tracing::debug!(
                        session_id = %self.session_id,
                        request_id = %request_id,
                        "response for unknown request id, dropped"
                    );
                }
            },

            Envelope::HttpBody {
                request_id,
                body,
                is_base64,
            } => {
                let Some((_, entry)) = self.pending.remove(&request_id) else {
                    tracing::debug!(
                        session_id = %self.session_id,
                        request_id = %request_id,
                        "body for unknown request id, dropped"
                    );
                    return;
                };
                let Some(head) = entry.head else {
                    // Dropping the entry completes the caller with a
                    // channel-closed error instead of letting it hang.
                    tracing::warn!(
                        session_id = %self.session_id,
                        request_id = %request_id,
                        "body arrived before response head, dropping request"
                    );
                    return;
                };
                let bytes = if is_base64 {
                    match BASE64.decode(body.as_bytes()) {
                        Ok(bytes) => bytes,
                        Err(error) => {
                            tracing::warn!(
                                session_id = %self.session_id,
                                request_id = %request_id,
                                error = %ProtocolError::Payload(error.to_string()),
                                "undecodable response body, dropping request"
                            );
                            return;
                        }
                    }
                } else {
                    body.into_bytes()
                };
                let _ = entry.responder.send(ProxiedResponse {
                    status: head.status,
                    headers: head.headers,
                    body: bytes,
                });
            }

            Envelope::StreamData { stream_id, payload } => {
                self.route_to_renter(stream_id, StreamFrame::Text(payload));
            }

            Envelope::StreamDataBinary { stream_id, payload } => {
                match BASE64.decode(payload.as_bytes()) {
                    Ok(bytes) => self.route_to_renter(stream_id, StreamFrame::Binary(bytes)),
                    Err(error) => {
                        tracing::warn!(
                            session_id = %self.session_id,
                            stream_id = %stream_id,
                            error = %ProtocolError::Payload(error.to_string()),
                            "undecodable stream payload, frame dropped"
                        );
                    }
                }
            }

            Envelope::StreamClose { stream_id } => {
                if let Some((_, route)) = self.streams.remove(&stream_id) {
                    tracing::debug!(
                        session_id = %self.session_id,
                        stream_id = %stream_id,
                        path = %route.path,
                        "stream closed by provider"
                    );
                    let _ = route.renter.send(StreamFrame::Close);
                } else {
                    tracing::debug!(
                        session_id = %self.session_id,
                        stream_id = %stream_id,
                        "close for unknown stream, dropped"
                    );
                }
            }

            Envelope::HttpRequest { .. }
            | Envelope::HttpBodyEmpty { .. }
            | Envelope::StreamOpen { .. } => {
                tracing::warn!(
                    session_id = %self.session_id,
                    "relay-bound envelope kind received from provider, dropped"
                );
            }
        }
    }

    fn route_to_renter(&self, stream_id: StreamId, frame: StreamFrame) {
        let delivered = match self.streams.get(&stream_id) {
            Some(route) => route.renter.send(frame).is_ok(),
            None => {
                tracing::debug!(
                    session_id = %self.session_id,
                    stream_id = %stream_id,
                    "frame for unknown stream, dropped"
                );
                return;
            }
        };
        if !delivered {
            // Renter receiver is gone; drop the route and tell the provider.
            let _ = self.close_stream_from_renter(stream_id);
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Complete every pending request with an error and close every bridged
    /// stream, leaving the channel itself usable. Runs when a lease ends
    /// while the provider stays connected.
    pub fn abort_inflight(&self) {
        let pending = self.pending.len();
        // Dropping the entries drops the responders, which completes the
        // blocked callers with a channel-closed error.
        self.pending.clear();

        let stream_ids: Vec<StreamId> = self.streams.iter().map(|entry| *entry.key()).collect();
        let streams = stream_ids.len();
        for stream_id in stream_ids {
            if let Some((_, route)) = self.streams.remove(&stream_id) {
                let _ = route.renter.send(StreamFrame::Close);
                let _ = self.send_envelope(&Envelope::StreamClose { stream_id });
            }
        }

        if pending > 0 || streams > 0 {
            tracing::info!(
                session_id = %self.session_id,
                pending,
                streams,
                "aborted in-flight tunnel work"
            );
        }
    }

    /// Tear the channel down for good: abort in-flight work and refuse any
    /// further sends. Runs when the provider socket closes or the session
    /// terminates.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.abort_inflight();
        // Ask the socket pump to close the provider connection too; when
        // shutdown was triggered by the socket itself this is a no-op.
        let _ = self.outbound.send(Frame::Close);
    }
}
