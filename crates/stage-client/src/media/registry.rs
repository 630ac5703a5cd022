//! Local Media Registry.
//!
//! Holds the locally captured microphone, camera and screenshare tracks. The
//! registry is the sole owner of those handles; strategies receive clones.
//! Every successful acquisition replaces (and thereby releases) the previous
//! handle of the same kind. A failed acquisition leaves the previous handle
//! untouched.
//!
//! State lives in a `tokio::sync::watch` sender so presentation code can
//! observe changes without polling.

use super::device::{CaptureConstraints, CaptureError, DeviceCapture, DeviceList};
use super::track::{CapturedTrack, LocalTrackHandle, MediaKind, TrackSource};
use crate::errors::StageError;
use crate::observability::metrics;

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Current local tracks.
#[derive(Debug, Clone, Default)]
pub struct LocalMediaSnapshot {
    pub audio: Option<LocalTrackHandle>,
    pub video: Option<LocalTrackHandle>,
    pub screenshare: Option<LocalTrackHandle>,
}

/// Outcome of a screenshare request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenshareCapture {
    /// A display track was acquired and installed.
    Started(LocalTrackHandle),
    /// The user dismissed the picker; nothing changed.
    Cancelled,
}

/// Registry of local capture tracks, shared by all sessions.
pub struct LocalMediaRegistry {
    capture: Arc<dyn DeviceCapture>,
    constraints: CaptureConstraints,
    simulcast: bool,
    state: watch::Sender<LocalMediaSnapshot>,
}

impl LocalMediaRegistry {
    /// Create an empty registry.
    ///
    /// # Arguments
    ///
    /// * `capture` - Device capture collaborator
    /// * `constraints` - Resolution limits for camera and display capture
    /// * `simulcast` - Publish hint applied to camera tracks
    #[must_use]
    pub fn new(
        capture: Arc<dyn DeviceCapture>,
        constraints: CaptureConstraints,
        simulcast: bool,
    ) -> Self {
        let (state, _) = watch::channel(LocalMediaSnapshot::default());
        Self {
            capture,
            constraints,
            simulcast,
            state,
        }
    }

    /// List input devices.
    ///
    /// # Errors
    ///
    /// Returns `StageError::NoDevices` when no camera or no microphone exists,
    /// and `StageError::DeviceUnavailable` when enumeration itself fails.
    pub async fn enumerate_devices(&self) -> Result<DeviceList, StageError> {
        let devices = self.capture.enumerate_devices().await.map_err(|e| {
            warn!(target: "stage.media.registry", error = %e, "Device enumeration failed");
            StageError::DeviceUnavailable(e.to_string())
        })?;

        let (video, audio): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .partition(|d| d.kind == MediaKind::Video);

        if video.is_empty() {
            return Err(StageError::NoDevices(MediaKind::Video));
        }
        if audio.is_empty() {
            return Err(StageError::NoDevices(MediaKind::Audio));
        }

        debug!(
            target: "stage.media.registry",
            video_devices = video.len(),
            audio_devices = audio.len(),
            "Devices enumerated"
        );

        Ok(DeviceList { video, audio })
    }

    /// Enumerate devices and select the first microphone and camera.
    ///
    /// # Errors
    ///
    /// Any enumeration or acquisition error; on error, tracks acquired
    /// before the failure stay installed.
    pub async fn initialize_default_devices(&self) -> Result<DeviceList, StageError> {
        let devices = self.enumerate_devices().await?;

        if let Some(mic) = devices.audio.first() {
            self.select_audio_device(&mic.device_id).await?;
        }
        if let Some(camera) = devices.video.first() {
            self.select_video_device(&camera.device_id).await?;
        }

        Ok(devices)
    }

    /// Acquire a camera track, replacing the current video handle.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DeviceUnavailable` if acquisition fails.
    pub async fn select_video_device(&self, device_id: &str) -> Result<LocalTrackHandle, StageError> {
        let captured = self
            .capture
            .acquire_camera(device_id, self.constraints)
            .await;
        let handle = self.install(captured, TrackSource::Camera, device_id)?;
        Ok(handle)
    }

    /// Acquire a microphone track, replacing the current audio handle.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DeviceUnavailable` if acquisition fails.
    pub async fn select_audio_device(&self, device_id: &str) -> Result<LocalTrackHandle, StageError> {
        let captured = self.capture.acquire_microphone(device_id).await;
        let handle = self.install(captured, TrackSource::Microphone, device_id)?;
        Ok(handle)
    }

    /// Prompt for a display surface and install its track.
    ///
    /// A dismissed picker is not an error: it yields
    /// [`ScreenshareCapture::Cancelled`] and leaves the registry unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DeviceUnavailable` for any other capture failure.
    pub async fn start_screenshare(&self) -> Result<ScreenshareCapture, StageError> {
        match self.capture.acquire_display(self.constraints).await {
            Ok(captured) => {
                metrics::record_device_acquisition("screen", "success");
                let handle = self.set_screenshare_track(Some(captured));
                Ok(handle.map_or(ScreenshareCapture::Cancelled, ScreenshareCapture::Started))
            }
            Err(CaptureError::Cancelled) => {
                metrics::record_device_acquisition("screen", "cancelled");
                debug!(target: "stage.media.registry", "Screenshare picker dismissed");
                Ok(ScreenshareCapture::Cancelled)
            }
            Err(e) => {
                metrics::record_device_acquisition("screen", "error");
                warn!(target: "stage.media.registry", error = %e, "Screenshare capture failed");
                Err(StageError::DeviceUnavailable(e.to_string()))
            }
        }
    }

    /// Install or clear the screenshare track. `None` clears.
    pub fn set_screenshare_track(&self, track: Option<CapturedTrack>) -> Option<LocalTrackHandle> {
        let handle = track.map(|t| LocalTrackHandle::new(t, TrackSource::Screen, false));
        let installed = handle.clone();
        self.state.send_modify(|state| {
            state.screenshare = installed;
        });

        info!(
            target: "stage.media.registry",
            active = handle.is_some(),
            "Screenshare track updated"
        );
        handle
    }

    /// Flip a handle's mute flag in place and notify observers.
    ///
    /// Returns the new mute state.
    pub fn toggle_mute(&self, handle: &LocalTrackHandle) -> bool {
        let muted = handle.toggle_muted();
        self.state.send_modify(|_| {});

        debug!(
            target: "stage.media.registry",
            track_id = %handle.id(),
            kind = %handle.kind(),
            muted,
            "Track mute toggled"
        );
        muted
    }

    #[must_use]
    pub fn audio(&self) -> Option<LocalTrackHandle> {
        self.state.borrow().audio.clone()
    }

    #[must_use]
    pub fn video(&self) -> Option<LocalTrackHandle> {
        self.state.borrow().video.clone()
    }

    #[must_use]
    pub fn screenshare(&self) -> Option<LocalTrackHandle> {
        self.state.borrow().screenshare.clone()
    }

    #[must_use]
    pub fn snapshot(&self) -> LocalMediaSnapshot {
        self.state.borrow().clone()
    }

    /// Subscribe to local media changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LocalMediaSnapshot> {
        self.state.subscribe()
    }

    fn install(
        &self,
        captured: Result<CapturedTrack, CaptureError>,
        source: TrackSource,
        device_id: &str,
    ) -> Result<LocalTrackHandle, StageError> {
        let kind = source.kind();
        let captured = captured.map_err(|e| {
            metrics::record_device_acquisition(kind.as_str(), "error");
            warn!(
                target: "stage.media.registry",
                kind = %kind,
                device_id = %device_id,
                error = %e,
                "Device acquisition failed"
            );
            StageError::DeviceUnavailable(e.to_string())
        })?;

        let simulcast = self.simulcast && source == TrackSource::Camera;
        let handle = LocalTrackHandle::new(captured, source, simulcast);

        let mut released = None;
        self.state.send_modify(|state| {
            let slot = match kind {
                MediaKind::Audio => &mut state.audio,
                MediaKind::Video => &mut state.video,
            };
            released = slot.replace(handle.clone());
        });

        metrics::record_device_acquisition(kind.as_str(), "success");
        info!(
            target: "stage.media.registry",
            kind = %kind,
            device_id = %device_id,
            track_id = %handle.id(),
            released_track_id = ?released.as_ref().map(LocalTrackHandle::id),
            "Local track selected"
        );

        Ok(handle)
    }
}
