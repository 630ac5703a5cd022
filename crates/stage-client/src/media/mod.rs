//! Local media: capture collaborator, track handles and the registry.
//!
//! # Modules
//!
//! - [`device`] - `DeviceCapture` trait, device descriptors and a mock
//! - [`track`] - `LocalTrackHandle` with shared mute state
//! - [`registry`] - `LocalMediaRegistry`, the single owner of local tracks

pub mod device;
pub mod registry;
pub mod track;

pub use device::{CaptureConstraints, CaptureError, DeviceCapture, DeviceInfo, DeviceList};
pub use registry::{LocalMediaRegistry, LocalMediaSnapshot, ScreenshareCapture};
pub use track::{CapturedTrack, LocalTrackHandle, LocalTrackInfo, MediaKind, TrackSource};
