//! Lifecycle audit events.
//!
//! Every transition and every security-relevant rejection produces one
//! [`LifecycleEvent`] handed to the configured [`AuditSink`]. The relay does
//! not keep history itself; the sink is the seam where an external audit log
//! attaches.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use runbridge_core::SessionId;
use serde::Serialize;

/// Kinds of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session registered.
    Created,
    /// Lease taken on a ready session.
    Locked,
    /// Abandoned lease reclaimed by its owner.
    Reconnected,
    /// Owner released the lease.
    Released,
    /// Lock decayed after the idle timeout.
    Abandoned,
    /// Cleanup started (release or grace expiry).
    Cleaning,
    /// Session reached its terminal state.
    Terminated,
    /// A caller failed the pinned principal/IP check.
    HijackRejected,
}

impl EventKind {
    /// Stable string form used in logs and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Locked => "locked",
            Self::Reconnected => "reconnected",
            Self::Released => "released",
            Self::Abandoned => "abandoned",
            Self::Cleaning => "cleaning",
            Self::Terminated => "terminated",
            Self::HijackRejected => "hijack_rejected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    /// The session the event concerns.
    pub session_id: SessionId,
    /// What happened.
    pub kind: EventKind,
    /// Free-form context (reason strings, principals, addresses).
    pub metadata: serde_json::Value,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    /// Build an event stamped now.
    #[must_use]
    pub fn new(session_id: SessionId, kind: EventKind, metadata: serde_json::Value) -> Self {
        Self {
            session_id,
            kind,
            metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Where lifecycle events go.
pub trait AuditSink: Send + Sync {
    /// Accept one event. Implementations must not block the caller for long;
    /// sinks that ship events elsewhere should buffer internally.
    fn emit(&self, event: LifecycleEvent);
}

/// The default sink: structured log emission.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: LifecycleEvent) {
        tracing::info!(
            target: "runbridge::audit",
            session_id = %event.session_id,
            kind = %event.kind,
            metadata = %event.metadata,
            "lifecycle event"
        );
    }
}

/// A sink that records events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingAuditSink {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    /// Count events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}
