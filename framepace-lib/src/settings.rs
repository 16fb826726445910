//! Pacing and lifecycle configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Tunables for the pump, the dispatch pipelines, and session teardown.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Media time the pump may decode ahead of playback before it throttles.
    pub max_read_ahead_ms: u64,
    /// Video delays at or below this are delivered immediately.
    pub min_video_delay_ms: u64,
    /// Suspension cap while the device clock is active but still settling.
    pub settling_cap_ms: u64,
    /// Elapsed playback time below which an active device clock is settling.
    pub settling_window_ms: u64,
    /// Suspension cap while only the wall clock is available.
    pub unreliable_cap_ms: u64,
    /// Suspension cap once the device clock is active and settled.
    pub reliable_cap_ms: u64,
    /// Maximum frames pulled while priming the audio device.
    pub warmup_max_frames: usize,
    /// Pause between warm-up pulls.
    pub warmup_poll_ms: u64,
    /// Audio device buffer length.
    pub audio_buffer_ms: u64,
    /// Graceful (then forced) wait applied to each pipeline on teardown.
    pub pipeline_shutdown_ms: u64,
    /// How long `stop()` waits for the pump thread before tearing down.
    pub stop_join_timeout_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            max_read_ahead_ms: 700,
            min_video_delay_ms: 1,
            settling_cap_ms: 300,
            settling_window_ms: 1500,
            unreliable_cap_ms: 1000,
            reliable_cap_ms: 2000,
            warmup_max_frames: 30,
            warmup_poll_ms: 5,
            audio_buffer_ms: 750,
            pipeline_shutdown_ms: 1500,
            stop_join_timeout_ms: 2500,
        }
    }
}

impl PlaybackSettings {
    /// Parse settings from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: PlaybackSettings = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    /// Read and parse a JSON settings file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Replace values that would disable pacing with their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_read_ahead_ms == 0 {
            self.max_read_ahead_ms = defaults.max_read_ahead_ms;
        }
        if self.unreliable_cap_ms == 0 {
            self.unreliable_cap_ms = defaults.unreliable_cap_ms;
        }
        if self.reliable_cap_ms == 0 {
            self.reliable_cap_ms = defaults.reliable_cap_ms;
        }
        if self.settling_cap_ms == 0 {
            self.settling_cap_ms = defaults.settling_cap_ms;
        }
        if self.audio_buffer_ms == 0 {
            self.audio_buffer_ms = defaults.audio_buffer_ms;
        }
        self
    }

    pub fn max_read_ahead(&self) -> Duration {
        Duration::from_millis(self.max_read_ahead_ms)
    }

    pub fn warmup_poll(&self) -> Duration {
        Duration::from_millis(self.warmup_poll_ms)
    }

    pub fn pipeline_shutdown(&self) -> Duration {
        Duration::from_millis(self.pipeline_shutdown_ms)
    }

    pub fn stop_join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }
}
