//! Stage client error types.
//!
//! Every failure is surfaced to whoever invoked the triggering operation.
//! The only silent path is a dismissed screenshare picker, which is not an
//! error at all (see [`crate::media::ScreenshareCapture::Cancelled`]).

use crate::actors::SessionState;
use crate::media::MediaKind;
use thiserror::Error;

/// Stage client error type.
///
/// Maps to an [`ErrorKind`] for presentation handling:
/// - `EmptyToken`: `UserInput`
/// - `DeviceUnavailable`, `NoDevices`: `DeviceUnavailable`
/// - `JoinFailed`: `TransportJoinFailure`
/// - `InvalidState`: `InvalidState`
/// - `LeaveFailed`, `Internal`: `Internal`
#[derive(Debug, Error)]
pub enum StageError {
    /// A join was requested with an empty token.
    #[error("Empty stage token")]
    EmptyToken,

    /// Acquiring a local capture device failed.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// No input device of the given kind exists.
    #[error("No {0} devices found")]
    NoDevices(MediaKind),

    /// Operation is not valid in the current session state.
    #[error("Invalid session state for {operation}: {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The transport rejected or failed the join (bad token, network).
    #[error("Join failed: {0}")]
    JoinFailed(String),

    /// The transport failed to tear the connection down.
    #[error("Leave failed: {0}")]
    LeaveFailed(String),

    /// Internal error (actor mailbox closed, response dropped).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error taxonomy used by the presentation layer to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The user supplied bad input; prompt and let them resubmit.
    UserInput,
    /// No usable capture device; a fatal setup condition until retried.
    DeviceUnavailable,
    /// The stage refused the join or the network failed during join.
    TransportJoinFailure,
    /// The request raced the session lifecycle.
    InvalidState,
    /// Anything else.
    Internal,
}

impl StageError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::EmptyToken => ErrorKind::UserInput,
            StageError::DeviceUnavailable(_) | StageError::NoDevices(_) => {
                ErrorKind::DeviceUnavailable
            }
            StageError::JoinFailed(_) => ErrorKind::TransportJoinFailure,
            StageError::InvalidState { .. } => ErrorKind::InvalidState,
            StageError::LeaveFailed(_) | StageError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns a message suitable for showing to the user.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            StageError::EmptyToken => "Please enter a token to join a stage".to_string(),
            StageError::DeviceUnavailable(msg) => format!("Unable to access device: {msg}"),
            StageError::NoDevices(kind) => format!("No {kind} devices found."),
            StageError::InvalidState { .. } => {
                "Please wait for the current stage operation to finish".to_string()
            }
            StageError::JoinFailed(msg) => format!("Error joining stage: {msg}"),
            StageError::LeaveFailed(msg) => format!("Error leaving stage: {msg}"),
            StageError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
