//! Local track handles.
//!
//! A [`LocalTrackHandle`] is a cheaply cloneable reference to one locally
//! captured track. Clones share the mute flag: muting through any clone is
//! visible to the registry, the strategy and the transport alike.

use common::types::TrackId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Media kind of a track or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {other}")),
        }
    }
}

/// Where a local track was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    Camera,
    Microphone,
    Screen,
}

impl TrackSource {
    /// Media kind produced by this source.
    #[must_use]
    pub const fn kind(&self) -> MediaKind {
        match self {
            TrackSource::Microphone => MediaKind::Audio,
            TrackSource::Camera | TrackSource::Screen => MediaKind::Video,
        }
    }
}

/// A raw track as delivered by the device capture API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedTrack {
    /// Platform identifier of the underlying media track.
    pub media_track_id: String,
    /// Device the track was captured from (`None` for display capture).
    pub device_id: Option<String>,
}

#[derive(Debug)]
struct LocalTrackInner {
    id: TrackId,
    source: TrackSource,
    device_id: Option<String>,
    media_track_id: String,
    simulcast: bool,
    muted: AtomicBool,
}

/// Shared handle to one locally captured track.
#[derive(Debug, Clone)]
pub struct LocalTrackHandle {
    inner: Arc<LocalTrackInner>,
}

impl LocalTrackHandle {
    /// Wrap a captured track. New tracks start unmuted.
    #[must_use]
    pub fn new(captured: CapturedTrack, source: TrackSource, simulcast: bool) -> Self {
        Self {
            inner: Arc::new(LocalTrackInner {
                id: TrackId::new(),
                source,
                device_id: captured.device_id,
                media_track_id: captured.media_track_id,
                simulcast,
                muted: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> TrackId {
        self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.source.kind()
    }

    #[must_use]
    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.inner.device_id.as_deref()
    }

    #[must_use]
    pub fn media_track_id(&self) -> &str {
        &self.inner.media_track_id
    }

    /// Whether the transport should publish simulcast layers for this track.
    #[must_use]
    pub fn simulcast(&self) -> bool {
        self.inner.simulcast
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::SeqCst);
    }

    /// Flip the mute flag in place and return the new value.
    pub fn toggle_muted(&self) -> bool {
        !self.inner.muted.fetch_xor(true, Ordering::SeqCst)
    }

    /// Returns true if both handles refer to the same captured track.
    #[must_use]
    pub fn same_track(&self, other: &LocalTrackHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Serializable view for the presentation layer.
    #[must_use]
    pub fn info(&self) -> LocalTrackInfo {
        LocalTrackInfo {
            id: self.id(),
            kind: self.kind(),
            source: self.source(),
            device_id: self.inner.device_id.clone(),
            muted: self.is_muted(),
        }
    }
}

impl PartialEq for LocalTrackHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

impl Eq for LocalTrackHandle {}

/// Point-in-time description of a local track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalTrackInfo {
    pub id: TrackId,
    pub kind: MediaKind,
    pub source: TrackSource,
    pub device_id: Option<String>,
    pub muted: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn camera(device: &str) -> LocalTrackHandle {
        LocalTrackHandle::new(
            CapturedTrack {
                media_track_id: format!("mt-{device}"),
                device_id: Some(device.to_string()),
            },
            TrackSource::Camera,
            true,
        )
    }

    #[test]
    fn test_mute_is_shared_between_clones() {
        let handle = camera("camA");
        let held_by_strategy = handle.clone();

        assert!(!held_by_strategy.is_muted());
        assert!(handle.toggle_muted());
        assert!(held_by_strategy.is_muted());
        assert!(!held_by_strategy.toggle_muted());
        assert!(!handle.is_muted());
    }

    #[test]
    fn test_equality_is_identity() {
        let a = camera("camA");
        let b = camera("camA");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_source_determines_kind() {
        assert_eq!(TrackSource::Camera.kind(), MediaKind::Video);
        assert_eq!(TrackSource::Screen.kind(), MediaKind::Video);
        assert_eq!(TrackSource::Microphone.kind(), MediaKind::Audio);
    }

    #[test]
    fn test_info_reflects_current_mute() {
        let handle = camera("camA");
        handle.set_muted(true);
        let info = handle.info();
        assert!(info.muted);
        assert_eq!(info.device_id.as_deref(), Some("camA"));
        assert_eq!(info.kind, MediaKind::Video);
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!("audio".parse::<MediaKind>(), Ok(MediaKind::Audio));
        assert!("data".parse::<MediaKind>().is_err());
    }
}
