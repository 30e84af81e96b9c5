//! Core types and utilities for runbridge.
//!
//! This crate provides the foundational types used throughout the runbridge
//! relay:
//!
//! - **Identifiers**: Strongly-typed ids for sessions, providers, principals
//!   and tunnel correlation ids
//! - **Access tokens**: The opaque credential a renter presents to lease a
//!   session
//!
//! # Example
//!
//! ```
//! use runbridge_core::{AccessToken, PrincipalId, SessionId};
//!
//! // Generate a session id
//! let session_id = SessionId::generate();
//!
//! // Mint an access token for it
//! let token = AccessToken::generate();
//!
//! // Principals arrive as opaque strings from the identity layer
//! let principal = PrincipalId::new("renter-7");
//! # let _ = (session_id, token, principal);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod token;

pub use ids::{IdError, PrincipalId, ProviderId, RequestId, SessionId, StreamId};
pub use token::AccessToken;
