//! Stage transport collaborator.
//!
//! The real-time transport is an external SDK. A connection is constructed
//! from `(token, strategy)`, joined asynchronously, and reports progress
//! through an ordered stream of [`StageEvent`]s. The session actor consumes
//! that stream; it never inspects transport internals.

use crate::media::MediaKind;
use crate::strategy::StrategyRef;

use common::types::{ParticipantId, StreamId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Connection state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Participant metadata attached to transport events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDescriptor {
    pub id: ParticipantId,
    pub user_id: String,
    pub is_local: bool,
}

impl ParticipantDescriptor {
    /// Descriptor for a remote participant.
    pub fn remote(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            user_id: user_id.into(),
            is_local: false,
        }
    }

    /// Descriptor for the local participant.
    pub fn local(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            user_id: user_id.into(),
            is_local: true,
        }
    }
}

/// A media stream as announced by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub id: StreamId,
    pub kind: MediaKind,
    /// Opaque transport handle for rendering.
    pub media_track_id: String,
}

impl StreamDescriptor {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        let id = id.into();
        Self {
            media_track_id: format!("remote-{id}"),
            id: StreamId::new(id),
            kind,
        }
    }
}

/// Events emitted by a stage connection, in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    ConnectionStateChanged(ConnectionState),
    ParticipantJoined(ParticipantDescriptor),
    ParticipantLeft(ParticipantDescriptor),
    StreamsAdded {
        participant: ParticipantDescriptor,
        streams: Vec<StreamDescriptor>,
    },
    StreamsRemoved {
        participant: ParticipantDescriptor,
        streams: Vec<StreamDescriptor>,
    },
    ParticipantMediaStateChanged {
        participant: ParticipantDescriptor,
        audio_muted: bool,
        video_stopped: bool,
    },
}

impl StageEvent {
    /// Event name for logs and metric labels.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            StageEvent::ConnectionStateChanged(_) => "connection_state_changed",
            StageEvent::ParticipantJoined(_) => "participant_joined",
            StageEvent::ParticipantLeft(_) => "participant_left",
            StageEvent::StreamsAdded { .. } => "streams_added",
            StageEvent::StreamsRemoved { .. } => "streams_removed",
            StageEvent::ParticipantMediaStateChanged { .. } => "media_state_changed",
        }
    }
}

/// Transport failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The stage refused the token.
    #[error("Token rejected: {0}")]
    Rejected(String),

    /// Network or signaling failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The connection is already torn down.
    #[error("Connection closed")]
    Closed,
}

/// An established (not necessarily joined) stage connection.
#[async_trait::async_trait]
pub trait StageConnection: Send + Sync {
    /// Join the stage. Resolves once the transport accepted the join.
    async fn join(&self) -> Result<(), TransportError>;

    /// Request teardown. Completion is signalled by a `Disconnected` event.
    fn leave(&self) -> Result<(), TransportError>;

    /// Ask the transport to re-poll the strategy it was constructed with.
    fn notify_strategy_changed(&self);
}

/// A connection plus its event stream.
pub struct StageLink {
    pub connection: Arc<dyn StageConnection>,
    pub events: mpsc::UnboundedReceiver<StageEvent>,
}

/// Factory for stage connections (enables mocking).
pub trait StageConnector: Send + Sync {
    /// Construct a connection bound to `strategy`. Does not join.
    fn open(&self, token: &str, strategy: StrategyRef) -> Result<StageLink, TransportError>;
}

/// Mock stage transport for testing.
pub mod mock {

    use super::*;
    use crate::media::LocalTrackHandle;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};
    use tokio::sync::Notify;

    /// How mock connections answer `join`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum JoinBehavior {
        /// Emit `Connecting`, then `Connected`, and resolve.
        Connect,
        /// Emit `Connecting`, then wait for [`MockConnection::release_join`].
        Hold,
        /// Fail with a network error.
        Fail,
    }

    /// Mock connector recording every opened connection.
    pub struct MockStageConnector {
        behavior: JoinBehavior,
        rejected_tokens: HashSet<String>,
        fail_leave: bool,
        open_count: AtomicUsize,
        connections: Mutex<Vec<Arc<MockConnection>>>,
    }

    impl Default for MockStageConnector {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockStageConnector {
        /// Connector whose connections join successfully.
        pub fn new() -> Self {
            Self {
                behavior: JoinBehavior::Connect,
                rejected_tokens: HashSet::new(),
                fail_leave: false,
                open_count: AtomicUsize::new(0),
                connections: Mutex::new(Vec::new()),
            }
        }

        #[must_use]
        pub fn with_join_behavior(mut self, behavior: JoinBehavior) -> Self {
            self.behavior = behavior;
            self
        }

        /// Reject joins made with any of these tokens.
        #[must_use]
        pub fn rejecting_tokens(mut self, tokens: &[&str]) -> Self {
            self.rejected_tokens = tokens.iter().map(|t| (*t).to_string()).collect();
            self
        }

        /// Make `leave` fail on every connection.
        #[must_use]
        pub fn failing_leave(mut self) -> Self {
            self.fail_leave = true;
            self
        }

        /// Number of connections constructed.
        pub fn open_count(&self) -> usize {
            self.open_count.load(Ordering::SeqCst)
        }

        /// Most recently constructed connection.
        pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
            self.connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last()
                .cloned()
        }
    }

    impl StageConnector for MockStageConnector {
        fn open(&self, token: &str, strategy: StrategyRef) -> Result<StageLink, TransportError> {
            self.open_count.fetch_add(1, Ordering::SeqCst);
            let (events_tx, events) = mpsc::unbounded_channel();

            let behavior = if self.rejected_tokens.contains(token) {
                None
            } else {
                Some(self.behavior)
            };

            let connection = Arc::new(MockConnection {
                token: token.to_string(),
                strategy,
                behavior,
                fail_leave: self.fail_leave,
                events: Mutex::new(Some(events_tx)),
                join_gate: Notify::new(),
                joined: AtomicBool::new(false),
                join_count: AtomicUsize::new(0),
                leave_count: AtomicUsize::new(0),
                refresh_count: AtomicUsize::new(0),
                published: Mutex::new(Vec::new()),
            });

            self.connections
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Arc::clone(&connection));

            Ok(StageLink { connection, events })
        }
    }

    /// Mock connection; tests drive remote events through [`MockConnection::emit`].
    pub struct MockConnection {
        token: String,
        strategy: StrategyRef,
        /// `None` when the token is rejected.
        behavior: Option<JoinBehavior>,
        fail_leave: bool,
        events: Mutex<Option<mpsc::UnboundedSender<StageEvent>>>,
        join_gate: Notify,
        joined: AtomicBool,
        join_count: AtomicUsize,
        leave_count: AtomicUsize,
        refresh_count: AtomicUsize,
        published: Mutex<Vec<LocalTrackHandle>>,
    }

    impl MockConnection {
        /// Token the connection was constructed with.
        pub fn token(&self) -> &str {
            &self.token
        }

        /// Push an event to the session as if the transport emitted it.
        pub fn emit(&self, event: StageEvent) {
            if let Some(events) = self
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
            {
                let _ = events.send(event);
            }
        }

        /// Drop the event sender, closing the session's event stream.
        pub fn close_events(&self) {
            self.events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }

        /// Complete a join held by [`JoinBehavior::Hold`].
        pub fn release_join(&self) {
            self.join_gate.notify_one();
        }

        pub fn is_joined(&self) -> bool {
            self.joined.load(Ordering::SeqCst)
        }

        pub fn join_count(&self) -> usize {
            self.join_count.load(Ordering::SeqCst)
        }

        pub fn leave_count(&self) -> usize {
            self.leave_count.load(Ordering::SeqCst)
        }

        pub fn refresh_count(&self) -> usize {
            self.refresh_count.load(Ordering::SeqCst)
        }

        /// Tracks the transport last polled from the strategy.
        pub fn published_tracks(&self) -> Vec<LocalTrackHandle> {
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn poll_strategy(&self) {
            let tracks = self.strategy.tracks_to_publish();
            *self.published.lock().unwrap_or_else(PoisonError::into_inner) = tracks;
        }

        fn connected(&self) {
            self.joined.store(true, Ordering::SeqCst);
            self.poll_strategy();
            self.emit(StageEvent::ConnectionStateChanged(ConnectionState::Connected));
        }
    }

    #[async_trait::async_trait]
    impl StageConnection for MockConnection {
        async fn join(&self) -> Result<(), TransportError> {
            self.join_count.fetch_add(1, Ordering::SeqCst);
            let Some(behavior) = self.behavior else {
                return Err(TransportError::Rejected("invalid stage token".to_string()));
            };

            match behavior {
                JoinBehavior::Connect => {
                    self.emit(StageEvent::ConnectionStateChanged(ConnectionState::Connecting));
                    self.connected();
                    Ok(())
                }
                JoinBehavior::Hold => {
                    self.emit(StageEvent::ConnectionStateChanged(ConnectionState::Connecting));
                    self.join_gate.notified().await;
                    self.connected();
                    Ok(())
                }
                JoinBehavior::Fail => Err(TransportError::Network("signaling unreachable".to_string())),
            }
        }

        fn leave(&self) -> Result<(), TransportError> {
            self.leave_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_leave {
                return Err(TransportError::Network("leave failed".to_string()));
            }
            self.joined.store(false, Ordering::SeqCst);
            self.emit(StageEvent::ConnectionStateChanged(ConnectionState::Disconnected));
            Ok(())
        }

        fn notify_strategy_changed(&self) {
            self.refresh_count.fetch_add(1, Ordering::SeqCst);
            self.poll_strategy();
        }
    }

}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_labels() {
        let p = ParticipantDescriptor::remote("p1", "alice");
        assert_eq!(
            StageEvent::ParticipantJoined(p.clone()).event_type(),
            "participant_joined"
        );
        assert_eq!(
            StageEvent::StreamsRemoved {
                participant: p,
                streams: vec![]
            }
            .event_type(),
            "streams_removed"
        );
    }

    #[test]
    fn test_descriptor_constructors() {
        assert!(ParticipantDescriptor::local("me", "u").is_local);
        assert!(!ParticipantDescriptor::remote("p1", "u").is_local);
        assert_eq!(StreamDescriptor::new("s1", MediaKind::Audio).id.as_str(), "s1");
    }
}
