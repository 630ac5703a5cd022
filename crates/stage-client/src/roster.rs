//! Remote participant roster.
//!
//! The roster is rebuilt by [`apply_event`], a pure reducer. Snapshots are
//! copy-on-write: readers holding an older [`Roster`] never observe later
//! changes, and an event that changes nothing returns the same snapshot
//! (see [`Roster::ptr_eq`]).
//!
//! The local participant is never stored here.

use crate::media::MediaKind;
use crate::transport::{ParticipantDescriptor, StageEvent, StreamDescriptor};

use common::types::{ParticipantId, StreamId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A remote media stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteStream {
    pub id: StreamId,
    pub kind: MediaKind,
    pub participant_id: ParticipantId,
    pub media_track_id: String,
}

impl RemoteStream {
    fn from_descriptor(participant_id: &ParticipantId, stream: &StreamDescriptor) -> Self {
        Self {
            id: stream.id.clone(),
            kind: stream.kind,
            participant_id: participant_id.clone(),
            media_track_id: stream.media_track_id.clone(),
        }
    }
}

/// A remote participant and its streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub user_id: String,
    pub is_local: bool,
    /// Most recently added first.
    pub streams: Vec<RemoteStream>,
    pub audio_muted: bool,
    pub video_stopped: bool,
}

impl Participant {
    fn joined(descriptor: &ParticipantDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            user_id: descriptor.user_id.clone(),
            is_local: descriptor.is_local,
            streams: Vec::new(),
            audio_muted: false,
            video_stopped: false,
        }
    }

    #[must_use]
    pub fn stream(&self, id: &StreamId) -> Option<&RemoteStream> {
        self.streams.iter().find(|s| &s.id == id)
    }
}

/// Immutable snapshot of the remote participants.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: Arc<BTreeMap<ParticipantId, Participant>>,
}

impl Roster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Participants ordered by id.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Returns true if both rosters are the same snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Roster) -> bool {
        Arc::ptr_eq(&self.participants, &other.participants)
    }

    /// Owned copy of the participants, for serialization.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }

    fn updated(&self, update: impl FnOnce(&mut BTreeMap<ParticipantId, Participant>)) -> Roster {
        let mut next = self.clone();
        update(Arc::make_mut(&mut next.participants));
        next
    }
}

impl PartialEq for Roster {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.participants == other.participants
    }
}

impl Eq for Roster {}

/// Apply one transport event to a roster.
///
/// Returns the input snapshot unchanged when the event has no effect:
/// connection-state events, anything concerning the local participant,
/// media events for unknown participants and removals of unknown streams.
#[must_use]
pub fn apply_event(roster: &Roster, event: &StageEvent) -> Roster {
    match event {
        StageEvent::ConnectionStateChanged(_) => roster.clone(),

        StageEvent::ParticipantJoined(participant) => {
            if participant.is_local {
                return roster.clone();
            }
            roster.updated(|map| {
                map.insert(participant.id.clone(), Participant::joined(participant));
            })
        }

        StageEvent::ParticipantLeft(participant) => {
            if participant.is_local || !roster.contains(&participant.id) {
                return roster.clone();
            }
            roster.updated(|map| {
                map.remove(&participant.id);
            })
        }

        StageEvent::StreamsAdded {
            participant,
            streams,
        } => {
            if participant.is_local || !roster.contains(&participant.id) || streams.is_empty() {
                return roster.clone();
            }
            roster.updated(|map| {
                if let Some(entry) = map.get_mut(&participant.id) {
                    let mut merged: Vec<RemoteStream> = streams
                        .iter()
                        .map(|s| RemoteStream::from_descriptor(&participant.id, s))
                        .collect();
                    merged.extend(
                        entry
                            .streams
                            .drain(..)
                            .filter(|existing| !streams.iter().any(|s| s.id == existing.id)),
                    );
                    entry.streams = merged;
                }
            })
        }

        StageEvent::StreamsRemoved {
            participant,
            streams,
        } => {
            if participant.is_local {
                return roster.clone();
            }
            let Some(entry) = roster.get(&participant.id) else {
                return roster.clone();
            };
            let removes_any = entry
                .streams
                .iter()
                .any(|existing| streams.iter().any(|s| s.id == existing.id));
            if !removes_any {
                return roster.clone();
            }
            roster.updated(|map| {
                if let Some(entry) = map.get_mut(&participant.id) {
                    entry
                        .streams
                        .retain(|existing| !streams.iter().any(|s| s.id == existing.id));
                }
            })
        }

        StageEvent::ParticipantMediaStateChanged {
            participant,
            audio_muted,
            video_stopped,
        } => {
            if participant.is_local {
                return roster.clone();
            }
            let Some(entry) = roster.get(&participant.id) else {
                return roster.clone();
            };
            if entry.audio_muted == *audio_muted && entry.video_stopped == *video_stopped {
                return roster.clone();
            }
            roster.updated(|map| {
                if let Some(entry) = map.get_mut(&participant.id) {
                    entry.audio_muted = *audio_muted;
                    entry.video_stopped = *video_stopped;
                }
            })
        }
    }
}
