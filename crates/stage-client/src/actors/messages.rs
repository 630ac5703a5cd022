//! Message and view types for session actors.
//!
//! Commands use `tokio::sync::mpsc` with `oneshot` replies; state flows back
//! out through a `watch` channel carrying [`SessionView`] snapshots.

use crate::errors::StageError;
use crate::roster::Roster;
use crate::storage::{SCREENSHARE_TOKEN_KEY, STAGE_TOKEN_KEY};
use crate::transport::{ConnectionState, ParticipantDescriptor};

use common::secret::SecretString;
use std::fmt;
use tokio::sync::oneshot;

/// Which stage connection a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Main stage: publishes camera/microphone, tracks the roster.
    Primary,
    /// Screenshare stage: publishes the screen track, subscribes to nothing.
    Screenshare,
}

impl SessionKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Primary => "primary",
            SessionKind::Screenshare => "screenshare",
        }
    }

    /// Session storage key the join token is cached under.
    #[must_use]
    pub const fn token_key(&self) -> &'static str {
        match self {
            SessionKind::Primary => STAGE_TOKEN_KEY,
            SessionKind::Screenshare => SCREENSHARE_TOKEN_KEY,
        }
    }

    /// Whether participant and media events feed the roster.
    #[must_use]
    pub const fn tracks_roster(&self) -> bool {
        matches!(self, SessionKind::Primary)
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle state.
///
/// `Idle -> Joining -> Joined -> Leaving -> Idle`. `Error` is entered when a
/// join or leave fails and is immediately followed by `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Joining,
    Joined,
    Leaving,
    Error,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined => "joined",
            SessionState::Leaving => "leaving",
            SessionState::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a session published after every change.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub state: SessionState,
    /// Last connection state reported by the transport.
    pub connection_state: ConnectionState,
    /// Remote participants; always empty for screenshare sessions.
    pub roster: Roster,
    pub local_participant: Option<ParticipantDescriptor>,
    /// Message of the most recent join or leave failure.
    pub last_error: Option<String>,
}

impl Default for SessionView {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            connection_state: ConnectionState::Disconnected,
            roster: Roster::new(),
            local_participant: None,
            last_error: None,
        }
    }
}

impl SessionView {
    /// True once the transport reported the session connected.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state == SessionState::Joined
    }
}

/// Messages sent to a `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Join the stage with the given token.
    Join {
        token: SecretString,
        /// Answered once the transport accepts or rejects the join.
        respond_to: oneshot::Sender<Result<(), StageError>>,
    },

    /// Leave the stage. Answered once teardown was requested.
    Leave {
        respond_to: oneshot::Sender<Result<(), StageError>>,
    },

    /// Ask the transport to re-poll the strategy.
    ///
    /// Replies `true` if the transport was notified, `false` if the session
    /// was not joined.
    RefreshStrategy {
        respond_to: oneshot::Sender<Result<bool, StageError>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_keys() {
        assert_eq!(SessionKind::Primary.token_key(), "stage-token");
        assert_eq!(
            SessionKind::Screenshare.token_key(),
            "stage-screenshare-token"
        );
    }

    #[test]
    fn test_only_primary_tracks_roster() {
        assert!(SessionKind::Primary.tracks_roster());
        assert!(!SessionKind::Screenshare.tracks_roster());
    }

    #[test]
    fn test_default_view_is_idle() {
        let view = SessionView::default();
        assert_eq!(view.state, SessionState::Idle);
        assert_eq!(view.connection_state, ConnectionState::Disconnected);
        assert!(view.roster.is_empty());
        assert!(!view.is_joined());
    }
}
