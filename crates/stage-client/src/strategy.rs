//! Publish/subscribe strategy.
//!
//! The transport receives a [`StrategyRef`] once, when the connection is
//! constructed, and polls it by reference from then on. Mutating the strategy
//! with [`Strategy::update_media`] is therefore invisible to an established
//! connection until the owning session calls `refresh_strategy`, which asks
//! the transport to re-poll.
//!
//! Both policies used by the client are the same type:
//!
//! | Constructor | Publishes | Subscribes |
//! |-------------|-----------|------------|
//! | [`Strategy::session`] | local video, local audio | configured level |
//! | [`Strategy::screenshare`] | screenshare video | `None` |

use crate::media::LocalTrackHandle;
use crate::transport::ParticipantDescriptor;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared reference handed to the transport.
pub type StrategyRef = Arc<Strategy>;

/// Fidelity at which remote tracks are pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionLevel {
    None,
    AudioOnly,
    AudioVideo,
}

impl SubscriptionLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SubscriptionLevel::None => "none",
            SubscriptionLevel::AudioOnly => "audio_only",
            SubscriptionLevel::AudioVideo => "audio_video",
        }
    }
}

impl fmt::Display for SubscriptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SubscriptionLevel::None),
            "audio_only" => Ok(SubscriptionLevel::AudioOnly),
            "audio_video" => Ok(SubscriptionLevel::AudioVideo),
            other => Err(format!("unknown subscription level: {other}")),
        }
    }
}

/// Which policy a strategy implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Publishes local audio and video.
    Session,
    /// Publishes only the screenshare track.
    Screenshare,
}

#[derive(Debug, Default)]
struct StrategyMedia {
    audio: Option<LocalTrackHandle>,
    video: Option<LocalTrackHandle>,
}

/// Publish/subscribe policy polled by the transport.
#[derive(Debug)]
pub struct Strategy {
    kind: StrategyKind,
    subscription_level: SubscriptionLevel,
    media: RwLock<StrategyMedia>,
}

impl Strategy {
    /// Strategy for the primary stage session.
    #[must_use]
    pub fn session(
        audio: Option<LocalTrackHandle>,
        video: Option<LocalTrackHandle>,
        subscription_level: SubscriptionLevel,
    ) -> Self {
        Self {
            kind: StrategyKind::Session,
            subscription_level,
            media: RwLock::new(StrategyMedia { audio, video }),
        }
    }

    /// Strategy for the screenshare session: publishes the screen track in
    /// the video slot and subscribes to nothing.
    #[must_use]
    pub fn screenshare(screenshare: Option<LocalTrackHandle>) -> Self {
        Self {
            kind: StrategyKind::Screenshare,
            subscription_level: SubscriptionLevel::None,
            media: RwLock::new(StrategyMedia {
                audio: None,
                video: screenshare,
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    #[must_use]
    pub fn subscription_level(&self) -> SubscriptionLevel {
        self.subscription_level
    }

    /// Tracks the transport should publish. Video precedes audio; the
    /// transport uses the order as a codec setup hint.
    #[must_use]
    pub fn tracks_to_publish(&self) -> Vec<LocalTrackHandle> {
        let media = self.media.read().unwrap_or_else(PoisonError::into_inner);
        media
            .video
            .iter()
            .chain(media.audio.iter())
            .cloned()
            .collect()
    }

    /// Whether local tracks are published to this participant.
    #[must_use]
    pub fn decide_publish(&self, _participant: &ParticipantDescriptor) -> bool {
        true
    }

    /// Subscription level for this participant's tracks.
    #[must_use]
    pub fn decide_subscribe(&self, _participant: &ParticipantDescriptor) -> SubscriptionLevel {
        self.subscription_level
    }

    /// Replace both local handles in place.
    ///
    /// Does not notify the transport; call `refresh_strategy` on the owning
    /// session afterwards.
    pub fn update_media(&self, audio: Option<LocalTrackHandle>, video: Option<LocalTrackHandle>) {
        let mut media = self.media.write().unwrap_or_else(PoisonError::into_inner);
        media.audio = audio;
        media.video = video;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::{CapturedTrack, TrackSource};

    fn track(source: TrackSource, id: &str) -> LocalTrackHandle {
        LocalTrackHandle::new(
            CapturedTrack {
                media_track_id: id.to_string(),
                device_id: Some(id.to_string()),
            },
            source,
            false,
        )
    }

    fn remote(id: &str) -> ParticipantDescriptor {
        ParticipantDescriptor::remote(id, "user")
    }

    #[test]
    fn test_video_published_before_audio() {
        let audio = track(TrackSource::Microphone, "micA");
        let video = track(TrackSource::Camera, "camA");
        let strategy = Strategy::session(
            Some(audio.clone()),
            Some(video.clone()),
            SubscriptionLevel::AudioVideo,
        );

        assert_eq!(strategy.tracks_to_publish(), vec![video, audio]);
    }

    #[test]
    fn test_missing_tracks_are_skipped() {
        let audio = track(TrackSource::Microphone, "micA");
        let strategy = Strategy::session(Some(audio.clone()), None, SubscriptionLevel::AudioVideo);
        assert_eq!(strategy.tracks_to_publish(), vec![audio]);

        let empty = Strategy::session(None, None, SubscriptionLevel::AudioVideo);
        assert!(empty.tracks_to_publish().is_empty());
    }

    #[test]
    fn test_update_media_replaces_handles() {
        let cam_a = track(TrackSource::Camera, "camA");
        let cam_b = track(TrackSource::Camera, "camB");
        let strategy = Strategy::session(None, Some(cam_a.clone()), SubscriptionLevel::AudioVideo);

        strategy.update_media(None, Some(cam_b.clone()));

        let published = strategy.tracks_to_publish();
        assert_eq!(published, vec![cam_b]);
        assert!(!published.contains(&cam_a));
    }

    #[test]
    fn test_screenshare_strategy_subscribes_to_nothing() {
        let screen = track(TrackSource::Screen, "screen");
        let strategy = Strategy::screenshare(Some(screen.clone()));

        assert_eq!(strategy.kind(), StrategyKind::Screenshare);
        assert_eq!(strategy.decide_subscribe(&remote("p1")), SubscriptionLevel::None);
        assert!(strategy.decide_publish(&remote("p1")));
        assert_eq!(strategy.tracks_to_publish(), vec![screen]);
    }

    #[test]
    fn test_session_strategy_uses_configured_level() {
        let strategy = Strategy::session(None, None, SubscriptionLevel::AudioOnly);
        assert_eq!(
            strategy.decide_subscribe(&remote("p1")),
            SubscriptionLevel::AudioOnly
        );
        assert!(strategy.decide_publish(&remote("p2")));
    }

    #[test]
    fn test_subscription_level_parse() {
        assert_eq!(
            "AUDIO_VIDEO".parse::<SubscriptionLevel>(),
            Ok(SubscriptionLevel::AudioVideo)
        );
        assert_eq!("none".parse::<SubscriptionLevel>(), Ok(SubscriptionLevel::None));
        assert!("video".parse::<SubscriptionLevel>().is_err());
    }
}
