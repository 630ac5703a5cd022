//! Session actors.
//!
//! ```text
//! StageClient
//! ├── SessionActor (primary): roster, local participant, primary strategy
//! └── SessionActor (screenshare): connection state only, screenshare strategy
//! ```
//!
//! Each session is a single task that applies user commands, transport
//! events and join completions one at a time, so every state transition and
//! roster mutation is serialized without locks. The two sessions share no
//! roster or strategy state.
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and its handle
//! - [`messages`] - Mailbox message types and the published `SessionView`

pub mod messages;
pub mod session;

pub use messages::{SessionKind, SessionMessage, SessionState, SessionView};
pub use session::{SessionActor, SessionActorHandle};
