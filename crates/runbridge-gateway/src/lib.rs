//! HTTP and WebSocket gateway for the runbridge relay.
//!
//! This crate provides the public-facing surface of the relay. It handles:
//!
//! - Session registration, heartbeats, and the lease endpoints
//! - The provider control channel (one long-lived WebSocket per session)
//! - Proxied HTTP calls and proxied WebSocket streams over that channel
//! - Translation of internal failures into the HTTP error taxonomy
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Renters (HTTP + WS)        Providers (WS out only)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     runbridge-gateway                       │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Principal  │ │   Router    │ │   Tunnel Pumps      │   │
//! │  │  Extractor  │ │ + Handlers  │ │ (control / stream)  │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Lease   │   │  Tunnel  │   │  Store   │
//!        │ Service  │   │ Registry │   │ (CAS ops)│
//!        └──────────┘   └──────────┘   └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod teardown;

pub use auth::AuthPrincipal;
pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
pub use teardown::TunnelTeardown;
