//! Device capture collaborator.
//!
//! The capture API (camera/microphone enumeration, `getUserMedia`-style track
//! acquisition, the display picker) is owned by the embedding platform.
//! [`DeviceCapture`] is the seam the registry calls through.

use super::track::{CapturedTrack, MediaKind};
use serde::Serialize;
use thiserror::Error;

/// An input device reported by the capture API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub kind: MediaKind,
}

/// Input devices grouped by kind, in the order the capture API reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceList {
    pub video: Vec<DeviceInfo>,
    pub audio: Vec<DeviceInfo>,
}

/// Resolution limits for video capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub max_width: u32,
    pub max_height: u32,
}

/// Capture failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The requested device does not exist.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The user or platform denied access.
    #[error("Permission denied: {0}")]
    Denied(String),

    /// Any other acquisition failure.
    #[error("Capture failed: {0}")]
    Failed(String),

    /// The user dismissed the picker.
    #[error("Cancelled by user")]
    Cancelled,
}

/// Trait for device capture operations (enables mocking).
#[async_trait::async_trait]
pub trait DeviceCapture: Send + Sync {
    /// List available input devices.
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError>;

    /// Acquire a camera track for the given device.
    async fn acquire_camera(
        &self,
        device_id: &str,
        constraints: CaptureConstraints,
    ) -> Result<CapturedTrack, CaptureError>;

    /// Acquire a microphone track for the given device.
    async fn acquire_microphone(&self, device_id: &str) -> Result<CapturedTrack, CaptureError>;

    /// Prompt for a display surface and acquire its video track.
    async fn acquire_display(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<CapturedTrack, CaptureError>;
}

/// Mock device capture module for testing.
pub mod mock {

    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How the mock answers a display capture request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DisplayBehavior {
        Grant,
        Cancel,
        Fail,
    }

    /// Mock device capture for unit testing.
    pub struct MockDeviceCapture {
        devices: Vec<DeviceInfo>,
        denied: HashSet<String>,
        display: DisplayBehavior,
        next_track: AtomicUsize,
        acquisitions: AtomicUsize,
    }

    impl MockDeviceCapture {
        /// Create a mock exposing the given cameras and microphones.
        pub fn with_devices(cameras: &[&str], microphones: &[&str]) -> Self {
            let devices = cameras
                .iter()
                .map(|id| DeviceInfo {
                    device_id: (*id).to_string(),
                    label: format!("Camera {id}"),
                    kind: MediaKind::Video,
                })
                .chain(microphones.iter().map(|id| DeviceInfo {
                    device_id: (*id).to_string(),
                    label: format!("Microphone {id}"),
                    kind: MediaKind::Audio,
                }))
                .collect();

            Self {
                devices,
                denied: HashSet::new(),
                display: DisplayBehavior::Grant,
                next_track: AtomicUsize::new(1),
                acquisitions: AtomicUsize::new(0),
            }
        }

        /// Deny access to the given device IDs.
        #[must_use]
        pub fn denying(mut self, device_ids: &[&str]) -> Self {
            self.denied = device_ids.iter().map(|id| (*id).to_string()).collect();
            self
        }

        /// Configure how display capture requests are answered.
        #[must_use]
        pub fn with_display(mut self, behavior: DisplayBehavior) -> Self {
            self.display = behavior;
            self
        }

        /// Number of successful track acquisitions.
        pub fn acquisition_count(&self) -> usize {
            self.acquisitions.load(Ordering::SeqCst)
        }

        fn acquire(&self, device_id: &str, kind: MediaKind) -> Result<CapturedTrack, CaptureError> {
            if self.denied.contains(device_id) {
                return Err(CaptureError::Denied(device_id.to_string()));
            }
            if !self
                .devices
                .iter()
                .any(|d| d.device_id == device_id && d.kind == kind)
            {
                return Err(CaptureError::NotFound(device_id.to_string()));
            }
            Ok(self.track(Some(device_id.to_string())))
        }

        fn track(&self, device_id: Option<String>) -> CapturedTrack {
            let n = self.next_track.fetch_add(1, Ordering::SeqCst);
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            CapturedTrack {
                media_track_id: format!("media-track-{n}"),
                device_id,
            }
        }
    }

    #[async_trait::async_trait]
    impl DeviceCapture for MockDeviceCapture {
        async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
            Ok(self.devices.clone())
        }

        async fn acquire_camera(
            &self,
            device_id: &str,
            _constraints: CaptureConstraints,
        ) -> Result<CapturedTrack, CaptureError> {
            self.acquire(device_id, MediaKind::Video)
        }

        async fn acquire_microphone(&self, device_id: &str) -> Result<CapturedTrack, CaptureError> {
            self.acquire(device_id, MediaKind::Audio)
        }

        async fn acquire_display(
            &self,
            _constraints: CaptureConstraints,
        ) -> Result<CapturedTrack, CaptureError> {
            match self.display {
                DisplayBehavior::Grant => Ok(self.track(None)),
                DisplayBehavior::Cancel => Err(CaptureError::Cancelled),
                DisplayBehavior::Fail => Err(CaptureError::Failed("display capture".to_string())),
            }
        }
    }

}
