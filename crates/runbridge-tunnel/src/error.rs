//! Error types for the tunnel relay.

use runbridge_core::StreamId;
use thiserror::Error;

/// A result type using `TunnelError`.
pub type Result<T> = std::result::Result<T, TunnelError>;

/// Errors raised while encoding or decoding control-channel envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope could not be serialized.
    #[error("envelope encoding failed: {0}")]
    Encode(String),

    /// The message is not a known envelope kind or is malformed.
    #[error("envelope decoding failed: {0}")]
    Decode(String),

    /// A binary payload carried invalid base64.
    #[error("invalid base64 payload: {0}")]
    Payload(String),
}

/// Errors that can occur while relaying tunnel traffic.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The session has no open control channel.
    #[error("no control channel for this session")]
    ChannelAbsent,

    /// The control channel closed while work was in flight.
    #[error("control channel closed")]
    ChannelClosed,

    /// The provider never answered within the per-request timeout.
    #[error("provider did not respond in time")]
    Timeout,

    /// No route exists for the stream.
    #[error("unknown stream: {0}")]
    StreamNotFound(StreamId),

    /// Envelope encoding/decoding failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TunnelError {
    /// Returns the appropriate HTTP status code for this error.
    ///
    /// Tunnel failures are transient-upstream by nature: the caller may
    /// retry once the provider reconnects.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::ChannelAbsent => 503,
            Self::ChannelClosed => 502,
            Self::Timeout => 504,
            Self::StreamNotFound(_) | Self::Protocol(_) => 502,
        }
    }
}
