//! Stage Client Library
//!
//! Session core for joining a real-time media stage:
//!
//! - Local capture tracks (camera, microphone, screenshare) and their mute state
//! - A publish/subscribe strategy polled by the transport
//! - Session reconciliation: user intent to connection lifecycle, transport
//!   events to an authoritative remote roster
//! - An independent screenshare session sharing the same local media
//!
//! # Architecture
//!
//! ```text
//! StageClient
//! ├── LocalMediaRegistry (owns local tracks)
//! ├── SessionActor (primary)      <- Strategy::session
//! └── SessionActor (screenshare)  <- Strategy::screenshare
//! ```
//!
//! The transport and the device capture API are external; they are reached
//! through the [`transport::StageConnector`] and [`media::DeviceCapture`]
//! traits, each with a mock for tests.
//!
//! # Key Design Decisions
//!
//! - **Pure roster reducer**: every transport event goes through
//!   [`roster::apply_event`] on the session actor, one at a time
//! - **Explicit strategy refresh**: mutating a strategy is invisible to a
//!   joined transport until `refresh_strategy`
//! - **Connection state is authoritative**: `Joined` and `Idle` follow the
//!   transport's connected/disconnected signals, not the join/leave calls
//!
//! # Modules
//!
//! - [`actors`] - Session actors and their published views
//! - [`client`] - `StageClient` facade
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types and presentation taxonomy
//! - [`media`] - Device capture, local tracks and the registry
//! - [`observability`] - Metrics
//! - [`roster`] - Remote participants and the event reducer
//! - [`storage`] - Session-scoped token cache
//! - [`strategy`] - Publish/subscribe policy
//! - [`transport`] - Stage transport collaborator

pub mod actors;
pub mod client;
pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod roster;
pub mod storage;
pub mod strategy;
pub mod transport;

pub use client::StageClient;
pub use config::Config;
pub use errors::{ErrorKind, StageError};
