//! Lease brokering for runbridge.
//!
//! This crate holds the safety-critical half of the relay: deciding who may
//! use which session, for how long, and what happens when either side goes
//! quiet. It coordinates between the storage layer and the audit sink.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Gateway (HTTP/WS)                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LeaseService                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │   Access    │ │   Lease     │ │   Reconciliation    │   │
//! │  │   Broker    │ │   Machine   │ │   Supervisor        │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Audit   │   │  Lease   │
//!        │ (CAS ops)│   │  Sink    │   │  Hooks   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # State Machine
//!
//! Sessions follow a strict state machine:
//!
//! - `Ready` → `Locked` (renter accesses) or `Terminated` (provider silent)
//! - `Locked` → `LockedAbandoned` (renter idle), `Cleaning` (release), or
//!   `Terminated` (provider silent)
//! - `LockedAbandoned` → `Locked` (same principal reconnects), `Cleaning`
//!   (grace window expires), or `Terminated` (provider silent)
//! - `Cleaning` → `Terminated` (provider acks cleanup, or cleanup stalls)
//! - `Terminated` is absorbing
//!
//! See the [`machine`] module for transition validation helpers and the
//! timeout-driven sweep decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod broker;
pub mod error;
pub mod hooks;
pub mod machine;
pub mod service;
pub mod supervisor;
pub mod types;

pub use audit::{AuditSink, EventKind, LifecycleEvent, RecordingAuditSink, TracingAuditSink};
pub use error::{LeaseError, Result};
pub use hooks::{LeaseHooks, NoopHooks};
pub use machine::{SweepAction, TerminateReason};
pub use service::{LeaseControl, LeaseService};
pub use types::{LeaseConfig, RegisterSessionRequest, RegisteredSession, SessionOffer, SweepReport};

// Re-export commonly used types from dependencies for convenience
pub use runbridge_core::{AccessToken, PrincipalId, ProviderId, SessionId};
pub use runbridge_store::{Session, SessionState, Store};
