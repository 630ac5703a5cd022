//! Stage client configuration.
//!
//! Configuration is loaded from environment variables with defaults matching
//! the stage's capture limits (720p camera and screenshare, simulcast on).

use crate::media::CaptureConstraints;
use crate::strategy::SubscriptionLevel;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default maximum capture width in pixels.
pub const DEFAULT_VIDEO_MAX_WIDTH: u32 = 1280;

/// Default maximum capture height in pixels.
pub const DEFAULT_VIDEO_MAX_HEIGHT: u32 = 720;

/// Default channel buffer size for a session actor mailbox.
pub const DEFAULT_SESSION_MAILBOX_BUFFER: usize = 100;

/// Stage client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Subscription level of the primary stage session (default: audio_video).
    pub subscribe_level: SubscriptionLevel,

    /// Maximum width requested for camera and screenshare capture.
    pub video_max_width: u32,

    /// Maximum height requested for camera and screenshare capture.
    pub video_max_height: u32,

    /// Whether camera tracks are published with simulcast layers.
    pub simulcast_enabled: bool,

    /// Mailbox buffer for each session actor.
    pub session_mailbox_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subscribe_level: SubscriptionLevel::AudioVideo,
            video_max_width: DEFAULT_VIDEO_MAX_WIDTH,
            video_max_height: DEFAULT_VIDEO_MAX_HEIGHT,
            simulcast_enabled: true,
            session_mailbox_buffer: DEFAULT_SESSION_MAILBOX_BUFFER,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let subscribe_level = match vars.get("STAGE_SUBSCRIBE_LEVEL") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "STAGE_SUBSCRIBE_LEVEL must be one of none, audio_only, audio_video (got {raw})"
                ))
            })?,
            None => SubscriptionLevel::AudioVideo,
        };

        let video_max_width = parse_positive(vars, "STAGE_VIDEO_MAX_WIDTH", DEFAULT_VIDEO_MAX_WIDTH)?;
        let video_max_height =
            parse_positive(vars, "STAGE_VIDEO_MAX_HEIGHT", DEFAULT_VIDEO_MAX_HEIGHT)?;

        let simulcast_enabled = match vars.get("STAGE_SIMULCAST_ENABLED") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!(
                    "STAGE_SIMULCAST_ENABLED must be true or false (got {raw})"
                ))
            })?,
            None => true,
        };

        let session_mailbox_buffer = match vars.get("STAGE_SESSION_MAILBOX_BUFFER") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "STAGE_SESSION_MAILBOX_BUFFER must be a positive integer (got {raw})"
                    )))
                }
            },
            None => DEFAULT_SESSION_MAILBOX_BUFFER,
        };

        Ok(Config {
            subscribe_level,
            video_max_width,
            video_max_height,
            simulcast_enabled,
            session_mailbox_buffer,
        })
    }

    /// Constraints for camera and screenshare capture.
    #[must_use]
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            max_width: self.video_max_width,
            max_height: self.video_max_height,
        }
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match vars.get(key) {
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue(format!(
                "{key} must be a positive integer (got {raw})"
            ))),
        },
        None => Ok(default),
    }
}
