//! Control-channel envelope protocol.
//!
//! Every discrete message exchanged with a provider over its control channel
//! is one [`Envelope`]: a closed, JSON-tagged union with one case per kind.
//! Unknown kinds fail decoding and are logged and dropped by the caller
//! rather than silently ignored.
//!
//! Correlation is by id, never by arrival order: `requestId` ties an
//! `http-response`/`http-body` pair back to its `http-request`, and
//! `streamId` ties data and close frames to their `stream-open`. Flows with
//! different ids interleave freely on one channel.

use std::collections::HashMap;

use runbridge_core::{RequestId, StreamId};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// One typed message on a provider control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Relay → provider: head of a proxied HTTP call. The body follows as a
    /// single raw binary frame, or as an `http-body-empty` marker.
    #[serde(rename_all = "camelCase")]
    HttpRequest {
        /// Correlation id for the call.
        request_id: RequestId,
        /// HTTP method.
        method: String,
        /// Path (plus query) on the provider's runtime.
        path: String,
        /// Request headers.
        headers: HashMap<String, String>,
    },

    /// Provider → relay: body of a proxied HTTP response.
    #[serde(rename_all = "camelCase")]
    HttpBody {
        /// Correlation id for the call.
        request_id: RequestId,
        /// Body content, possibly base64-encoded.
        body: String,
        /// True when `body` is base64.
        is_base64: bool,
    },

    /// Relay → provider: the proxied call has no body.
    #[serde(rename_all = "camelCase")]
    HttpBodyEmpty {
        /// Correlation id for the call.
        request_id: RequestId,
    },

    /// Provider → relay: head of a proxied HTTP response. The body follows
    /// as a separate `http-body` envelope.
    #[serde(rename_all = "camelCase")]
    HttpResponse {
        /// Correlation id for the call.
        request_id: RequestId,
        /// HTTP status code.
        status: u16,
        /// Response headers.
        headers: HashMap<String, String>,
    },

    /// Relay → provider: open a stream to a named path.
    #[serde(rename_all = "camelCase")]
    StreamOpen {
        /// Correlation id for the stream.
        stream_id: StreamId,
        /// Target path on the provider side.
        path: String,
    },

    /// Text frame, either direction.
    #[serde(rename_all = "camelCase")]
    StreamData {
        /// Correlation id for the stream.
        stream_id: StreamId,
        /// Frame content.
        payload: String,
    },

    /// Binary frame, either direction, base64-encoded for transport safety.
    #[serde(rename_all = "camelCase")]
    StreamDataBinary {
        /// Correlation id for the stream.
        stream_id: StreamId,
        /// Base64-encoded frame content.
        payload: String,
    },

    /// Close a stream, either direction. The receiving side closes its end
    /// and forgets the route.
    #[serde(rename_all = "camelCase")]
    StreamClose {
        /// Correlation id for the stream.
        stream_id: StreamId,
    },
}

impl Envelope {
    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse one envelope from its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::Decode` for malformed JSON or unknown kinds.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
