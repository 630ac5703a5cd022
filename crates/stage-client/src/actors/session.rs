//! `SessionActor` - one actor per stage connection.
//!
//! The actor owns the session state machine, the transport connection and
//! the roster. Three inputs are multiplexed in one loop:
//!
//! - user commands from the mailbox (join, leave, refresh)
//! - transport events, in transport order
//! - join completions, reported by a spawned task so the loop keeps
//!   consuming transport events while a join is in flight
//!
//! Join completions carry a generation number; a completion from an earlier
//! connection is answered with an error and otherwise ignored.
//!
//! # Lifecycle
//!
//! 1. `join` constructs a connection bound to the strategy: `Joining`
//! 2. The transport's `Connected` signal: `Joined`, token cached
//! 3. `leave` requests teardown: `Leaving`
//! 4. The transport's `Disconnected` signal: `Idle`, roster cleared
//!
//! A failed join or leave passes through `Error` back to `Idle`.

use super::messages::{SessionKind, SessionMessage, SessionState, SessionView};
use crate::errors::StageError;
use crate::observability::metrics;
use crate::roster::{apply_event, Roster};
use crate::storage::TokenStorage;
use crate::strategy::StrategyRef;
use crate::transport::{
    ConnectionState, ParticipantDescriptor, StageConnection, StageConnector, StageEvent,
    TransportError,
};

use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    kind: SessionKind,
    view: watch::Receiver<SessionView>,
}

impl SessionActorHandle {
    #[must_use]
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Join the stage.
    ///
    /// Resolves once the transport accepted or rejected the join. The session
    /// reaches `Joined` on the transport's connected signal, which the
    /// transport normally emits before accepting.
    ///
    /// # Errors
    ///
    /// - `StageError::EmptyToken` if the token is blank (no transport call)
    /// - `StageError::InvalidState` if the session is not idle
    /// - `StageError::JoinFailed` if the transport rejected the join
    pub async fn join(&self, token: SecretString) -> Result<(), StageError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Join {
            token,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| StageError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the stage. A no-op when idle or already leaving.
    ///
    /// # Errors
    ///
    /// - `StageError::InvalidState` while a join is in flight
    /// - `StageError::LeaveFailed` if the transport refused teardown
    pub async fn leave(&self) -> Result<(), StageError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::Leave { respond_to: tx }).await?;

        rx.await
            .map_err(|e| StageError::Internal(format!("response receive failed: {e}")))?
    }

    /// Ask the transport to re-poll the strategy.
    ///
    /// Returns `false` without touching the transport unless joined.
    pub async fn refresh_strategy(&self) -> Result<bool, StageError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionMessage::RefreshStrategy { respond_to: tx })
            .await?;

        rx.await
            .map_err(|e| StageError::Internal(format!("response receive failed: {e}")))?
    }

    /// Current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Subscribe to session snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: SessionMessage) -> Result<(), StageError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| StageError::Internal(format!("channel send failed: {e}")))
    }
}

/// Result of a spawned `StageConnection::join`.
struct JoinCompletion {
    generation: u64,
    result: Result<(), TransportError>,
    started: Instant,
    respond_to: oneshot::Sender<Result<(), StageError>>,
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    kind: SessionKind,
    state: SessionState,
    connection_state: ConnectionState,
    strategy: StrategyRef,
    connector: Arc<dyn StageConnector>,
    storage: Arc<dyn TokenStorage>,
    /// Live connection, if any.
    connection: Option<Arc<dyn StageConnection>>,
    /// Event stream of the live connection.
    events: Option<mpsc::UnboundedReceiver<StageEvent>>,
    /// Token of the join in flight; cached once connected.
    pending_token: Option<SecretString>,
    /// Bumped for every constructed connection.
    generation: u64,
    roster: Roster,
    local_participant: Option<ParticipantDescriptor>,
    last_error: Option<String>,
    receiver: mpsc::Receiver<SessionMessage>,
    join_results_tx: mpsc::UnboundedSender<JoinCompletion>,
    join_results: mpsc::UnboundedReceiver<JoinCompletion>,
    view: watch::Sender<SessionView>,
    cancel_token: CancellationToken,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        kind: SessionKind,
        strategy: StrategyRef,
        connector: Arc<dyn StageConnector>,
        storage: Arc<dyn TokenStorage>,
        mailbox_buffer: usize,
        cancel_token: CancellationToken,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(mailbox_buffer.max(1));
        let (join_results_tx, join_results) = mpsc::unbounded_channel();
        let (view, view_rx) = watch::channel(SessionView::default());

        let actor = Self {
            kind,
            state: SessionState::Idle,
            connection_state: ConnectionState::Disconnected,
            strategy,
            connector,
            storage,
            connection: None,
            events: None,
            pending_token: None,
            generation: 0,
            roster: Roster::new(),
            local_participant: None,
            last_error: None,
            receiver,
            join_results_tx,
            join_results,
            view,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            kind,
            view: view_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    ///
    /// Transport events are polled before commands and join completions so
    /// that signals emitted during a join are applied before its reply.
    #[instrument(skip_all, name = "stage.actor.session", fields(session = %self.kind))]
    async fn run(mut self) {
        debug!(
            target: "stage.actor.session",
            session = %self.kind,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "stage.actor.session",
                        session = %self.kind,
                        "SessionActor received cancellation signal"
                    );
                    self.teardown();
                    break;
                }

                event = next_event(&mut self.events) => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => self.handle_events_closed(),
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            debug!(
                                target: "stage.actor.session",
                                session = %self.kind,
                                "SessionActor channel closed, exiting"
                            );
                            self.teardown();
                            break;
                        }
                    }
                }

                Some(completion) = self.join_results.recv() => {
                    self.handle_join_completion(completion);
                }
            }
        }

        info!(
            target: "stage.actor.session",
            session = %self.kind,
            state = %self.state,
            "SessionActor stopped"
        );
    }

    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join { token, respond_to } => {
                self.handle_join(token, respond_to);
            }

            SessionMessage::Leave { respond_to } => {
                let _ = respond_to.send(self.handle_leave());
            }

            SessionMessage::RefreshStrategy { respond_to } => {
                let _ = respond_to.send(Ok(self.handle_refresh()));
            }
        }
    }

    /// Start a join. Refused requests are answered here; accepted ones are
    /// answered by the join completion.
    fn handle_join(
        &mut self,
        token: SecretString,
        respond_to: oneshot::Sender<Result<(), StageError>>,
    ) {
        if token.expose_secret().trim().is_empty() {
            metrics::record_session_join(self.kind.as_str(), "empty_token", None);
            let _ = respond_to.send(Err(StageError::EmptyToken));
            return;
        }

        if !matches!(self.state, SessionState::Idle | SessionState::Error) {
            debug!(
                target: "stage.actor.session",
                session = %self.kind,
                state = %self.state,
                "Join refused, session not idle"
            );
            let _ = respond_to.send(Err(StageError::InvalidState {
                operation: "join",
                state: self.state,
            }));
            return;
        }

        let link = match self
            .connector
            .open(token.expose_secret(), Arc::clone(&self.strategy))
        {
            Ok(link) => link,
            Err(e) => {
                metrics::record_session_join(self.kind.as_str(), "error", None);
                let message = e.to_string();
                self.fail(&message);
                let _ = respond_to.send(Err(StageError::JoinFailed(message)));
                return;
            }
        };

        self.generation += 1;
        self.connection = Some(Arc::clone(&link.connection));
        self.events = Some(link.events);
        self.pending_token = Some(token);
        self.last_error = None;
        self.state = SessionState::Joining;
        self.publish();

        info!(
            target: "stage.actor.session",
            session = %self.kind,
            generation = self.generation,
            "Joining stage"
        );

        let connection = link.connection;
        let completions = self.join_results_tx.clone();
        let generation = self.generation;
        let started = Instant::now();
        tokio::spawn(async move {
            let result = connection.join().await;
            let _ = completions.send(JoinCompletion {
                generation,
                result,
                started,
                respond_to,
            });
        });
    }

    fn handle_join_completion(&mut self, completion: JoinCompletion) {
        let JoinCompletion {
            generation,
            result,
            started,
            respond_to,
        } = completion;
        let session = self.kind.as_str();

        if generation != self.generation {
            debug!(
                target: "stage.actor.session",
                session = %self.kind,
                generation,
                current_generation = self.generation,
                "Ignoring stale join completion"
            );
            let _ = respond_to.send(Err(StageError::JoinFailed(
                "join superseded by a newer connection".to_string(),
            )));
            return;
        }

        match result {
            Ok(()) if matches!(self.state, SessionState::Joining | SessionState::Joined) => {
                metrics::record_session_join(session, "success", Some(started.elapsed()));
                info!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    state = %self.state,
                    "Join accepted by transport"
                );
                let _ = respond_to.send(Ok(()));
            }
            Ok(()) => {
                metrics::record_session_join(session, "error", Some(started.elapsed()));
                warn!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    state = %self.state,
                    "Connection closed before join completed"
                );
                let _ = respond_to.send(Err(StageError::JoinFailed(
                    "connection closed before join completed".to_string(),
                )));
            }
            Err(e) => {
                let outcome = match e {
                    TransportError::Rejected(_) => "rejected",
                    TransportError::Network(_) | TransportError::Closed => "error",
                };
                metrics::record_session_join(session, outcome, Some(started.elapsed()));
                warn!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    error = %e,
                    "Error joining stage"
                );
                let message = e.to_string();
                self.reset_connection();
                self.fail(&message);
                let _ = respond_to.send(Err(StageError::JoinFailed(message)));
            }
        }
    }

    fn handle_leave(&mut self) -> Result<(), StageError> {
        match self.state {
            SessionState::Idle | SessionState::Leaving | SessionState::Error => {
                debug!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    state = %self.state,
                    "Leave ignored"
                );
                Ok(())
            }
            SessionState::Joining => Err(StageError::InvalidState {
                operation: "leave",
                state: self.state,
            }),
            SessionState::Joined => {
                let Some(connection) = self.connection.clone() else {
                    self.reset_connection();
                    self.state = SessionState::Idle;
                    self.publish();
                    return Ok(());
                };

                self.state = SessionState::Leaving;
                self.publish();

                match connection.leave() {
                    Ok(()) => {
                        info!(
                            target: "stage.actor.session",
                            session = %self.kind,
                            "Leaving stage"
                        );
                        Ok(())
                    }
                    Err(e) => {
                        warn!(
                            target: "stage.actor.session",
                            session = %self.kind,
                            error = %e,
                            "Error leaving stage"
                        );
                        let message = e.to_string();
                        self.reset_connection();
                        self.fail(&message);
                        Err(StageError::LeaveFailed(message))
                    }
                }
            }
        }
    }

    fn handle_refresh(&self) -> bool {
        if self.state != SessionState::Joined {
            debug!(
                target: "stage.actor.session",
                session = %self.kind,
                state = %self.state,
                "Strategy refresh skipped, not joined"
            );
            return false;
        }

        let Some(connection) = &self.connection else {
            return false;
        };
        connection.notify_strategy_changed();
        metrics::record_strategy_refresh(self.kind.as_str());
        debug!(
            target: "stage.actor.session",
            session = %self.kind,
            "Strategy refresh requested"
        );
        true
    }

    fn handle_event(&mut self, event: StageEvent) {
        if let StageEvent::ConnectionStateChanged(state) = event {
            self.handle_connection_state(state);
            return;
        }

        if !self.kind.tracks_roster() {
            return;
        }

        match &event {
            StageEvent::ParticipantJoined(participant) if participant.is_local => {
                self.local_participant = Some(participant.clone());
            }
            StageEvent::ParticipantLeft(participant) if participant.is_local => {
                self.local_participant = None;
            }
            _ => {}
        }

        let next = apply_event(&self.roster, &event);
        let applied = !next.ptr_eq(&self.roster);
        metrics::record_roster_event(self.kind.as_str(), event.event_type(), applied);

        debug!(
            target: "stage.actor.session",
            session = %self.kind,
            event_type = event.event_type(),
            applied,
            "Transport event processed"
        );

        if applied {
            self.roster = next;
            metrics::set_remote_participants(self.kind.as_str(), self.roster.len());
        }
        self.publish();
    }

    fn handle_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;

        match state {
            ConnectionState::Connected => {
                if self.state == SessionState::Joining {
                    self.state = SessionState::Joined;
                    if let Some(token) = self.pending_token.take() {
                        self.storage.store(self.kind.token_key(), token);
                    }
                    info!(
                        target: "stage.actor.session",
                        session = %self.kind,
                        "Stage joined"
                    );
                }
            }
            ConnectionState::Disconnected => {
                if self.state != SessionState::Idle {
                    info!(
                        target: "stage.actor.session",
                        session = %self.kind,
                        previous_state = %self.state,
                        "Stage disconnected"
                    );
                }
                self.reset_connection();
                self.state = SessionState::Idle;
            }
            ConnectionState::Errored => {
                warn!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    state = %self.state,
                    "Transport reported connection error"
                );
            }
            ConnectionState::Connecting => {}
        }

        self.publish();
    }

    fn handle_events_closed(&mut self) {
        self.events = None;
        if self.state == SessionState::Idle {
            return;
        }
        warn!(
            target: "stage.actor.session",
            session = %self.kind,
            state = %self.state,
            "Transport event stream closed, treating as disconnected"
        );
        self.handle_connection_state(ConnectionState::Disconnected);
    }

    /// Record a failure, publish `Error`, then settle in `Idle`.
    fn fail(&mut self, message: &str) {
        self.last_error = Some(message.to_string());
        self.state = SessionState::Error;
        self.publish();
        self.state = SessionState::Idle;
        self.connection_state = ConnectionState::Disconnected;
        self.publish();
    }

    /// Drop the connection and everything derived from it.
    fn reset_connection(&mut self) {
        self.connection = None;
        self.events = None;
        self.pending_token = None;
        self.local_participant = None;
        if !self.roster.is_empty() {
            self.roster = Roster::new();
            metrics::set_remote_participants(self.kind.as_str(), 0);
        }
    }

    /// Best-effort leave on shutdown.
    fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.leave() {
                warn!(
                    target: "stage.actor.session",
                    session = %self.kind,
                    error = %e,
                    "Leave during shutdown failed"
                );
            }
        }
        self.reset_connection();
        self.state = SessionState::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            state: self.state,
            connection_state: self.connection_state,
            roster: self.roster.clone(),
            local_participant: self.local_participant.clone(),
            last_error: self.last_error.clone(),
        });
    }
}

async fn next_event(events: &mut Option<mpsc::UnboundedReceiver<StageEvent>>) -> Option<StageEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
