//! Suspension arithmetic shared by the video pipeline and the pump.

use std::time::Duration;

use crate::settings::PlaybackSettings;

/// How far the playback clock can be trusted when a suspension is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClockReliability {
    /// Only the wall clock is available.
    Unreliable,
    /// The device clock is active but playback has barely begun.
    Settling,
    /// The device clock is active and past the settling window.
    Reliable,
}

impl ClockReliability {
    pub(crate) fn sample(active: bool, elapsed_us: i64, settings: &PlaybackSettings) -> Self {
        if !active {
            Self::Unreliable
        } else if elapsed_us < settings.settling_window_ms as i64 * 1000 {
            Self::Settling
        } else {
            Self::Reliable
        }
    }

    pub(crate) fn cap(&self, settings: &PlaybackSettings) -> Duration {
        let ms = match self {
            Self::Unreliable => settings.unreliable_cap_ms,
            Self::Settling => settings.settling_cap_ms,
            Self::Reliable => settings.reliable_cap_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Clamp `requested_us` to the cap of the current reliability state.
pub(crate) fn clamp_suspension(
    requested_us: i64,
    active: bool,
    elapsed_us: i64,
    settings: &PlaybackSettings,
) -> Duration {
    if requested_us <= 0 {
        return Duration::ZERO;
    }
    let cap = ClockReliability::sample(active, elapsed_us, settings).cap(settings);
    Duration::from_micros(requested_us as u64).min(cap)
}

/// Wait before presenting a video frame due at `target_us`, if any.
pub(crate) fn video_delay(
    target_us: i64,
    elapsed_us: i64,
    active: bool,
    settings: &PlaybackSettings,
) -> Option<Duration> {
    let delay_us = target_us - elapsed_us;
    if delay_us <= settings.min_video_delay_ms as i64 * 1000 {
        return None;
    }
    Some(clamp_suspension(delay_us, active, elapsed_us, settings))
}

/// Backpressure pause for a frame due at `relative_us`, if decoding is too far
/// ahead of playback.
pub(crate) fn backpressure(
    relative_us: i64,
    elapsed_us: i64,
    active: bool,
    settings: &PlaybackSettings,
) -> Option<Duration> {
    let read_ahead_us = relative_us - elapsed_us;
    let limit_us = settings.max_read_ahead().as_micros() as i64;
    if read_ahead_us <= limit_us {
        return None;
    }
    Some(clamp_suspension(
        read_ahead_us - limit_us,
        active,
        elapsed_us,
        settings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PlaybackSettings {
        PlaybackSettings::default()
    }

    #[test]
    fn reliability_follows_clock_state() {
        let s = settings();
        assert_eq!(
            ClockReliability::sample(false, 10_000_000, &s),
            ClockReliability::Unreliable
        );
        assert_eq!(
            ClockReliability::sample(true, 1_000_000, &s),
            ClockReliability::Settling
        );
        assert_eq!(
            ClockReliability::sample(true, 1_500_000, &s),
            ClockReliability::Reliable
        );
    }

    #[test]
    fn short_video_delays_are_skipped() {
        let s = settings();
        assert_eq!(video_delay(1_000, 0, false, &s), None);
        assert_eq!(video_delay(0, 5_000, false, &s), None);
        assert_eq!(
            video_delay(33_000, 0, false, &s),
            Some(Duration::from_millis(33))
        );
    }

    #[test]
    fn video_delay_is_capped_per_state() {
        let s = settings();
        assert_eq!(
            video_delay(10_000_000, 0, false, &s),
            Some(Duration::from_millis(1000))
        );
        assert_eq!(
            video_delay(10_000_000, 0, true, &s),
            Some(Duration::from_millis(300))
        );
        assert_eq!(
            video_delay(10_000_000, 2_000_000, true, &s),
            Some(Duration::from_millis(2000))
        );
    }

    #[test]
    fn backpressure_starts_past_read_ahead_limit() {
        let s = settings();
        assert_eq!(backpressure(700_000, 0, false, &s), None);
        assert_eq!(
            backpressure(900_000, 0, false, &s),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            backpressure(60_000_000, 0, true, &s),
            Some(Duration::from_millis(300))
        );
    }
}
