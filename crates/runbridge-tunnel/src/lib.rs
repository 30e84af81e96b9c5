//! Tunnel relay for runbridge.
//!
//! Providers are reachable only through the single control channel they keep
//! open to the relay. This crate multiplexes renter traffic onto that
//! channel and demultiplexes the provider's answers:
//!
//! - **Request channel**: each proxied HTTP call becomes an envelope pair on
//!   the control channel, correlated back to the blocked caller by
//!   `requestId`.
//! - **Stream channel**: each proxied WebSocket becomes a `streamId`-tagged
//!   frame flow, bridged to the renter's socket for the life of the stream.
//!
//! The crate is transport-agnostic: outbound traffic is surfaced as
//! [`Frame`] values on an mpsc receiver, and inbound provider messages are
//! fed in through [`ControlChannel::handle_envelope`]. The gateway owns the
//! actual WebSocket and pumps both directions.
//!
//! Pending-request and stream-route tables are scoped to one control
//! channel and die with it: closing the channel completes every blocked
//! caller with a channel-closed error and closes every bridged stream.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod channel;
pub mod error;
pub mod protocol;
pub mod registry;

pub use channel::{ControlChannel, Frame, ProxiedRequest, ProxiedResponse, StreamFrame};
pub use error::{ProtocolError, Result, TunnelError};
pub use protocol::Envelope;
pub use registry::ChannelRegistry;

// Re-export the correlation ids for convenience
pub use runbridge_core::{RequestId, SessionId, StreamId};
