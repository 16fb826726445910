use super::PlayerBuilder;

impl PlayerBuilder {
    /// Configure how far decoding may run ahead of playback (ms).
    ///
    /// `0` restores the default.
    pub fn max_read_ahead_ms(mut self, ms: i64) -> Self {
        self.settings.max_read_ahead_ms = ms.max(0) as u64;
        self.settings = self.settings.sanitized();
        self
    }

    /// Configure the video delay below which frames are shown immediately (ms).
    pub fn min_video_delay_ms(mut self, ms: i64) -> Self {
        self.settings.min_video_delay_ms = ms.max(0) as u64;
        self
    }

    /// Configure the maximum number of frames pulled while priming audio.
    ///
    /// `0` skips warm-up entirely.
    pub fn warmup_max_frames(mut self, frames: usize) -> Self {
        self.settings.warmup_max_frames = frames;
        self
    }

    /// Configure the pause between warm-up pulls (ms).
    pub fn warmup_poll_ms(mut self, ms: i64) -> Self {
        self.settings.warmup_poll_ms = ms.max(0) as u64;
        self
    }

    /// Configure the audio device buffer length (ms). `0` restores the default.
    pub fn audio_buffer_ms(mut self, ms: i64) -> Self {
        self.settings.audio_buffer_ms = ms.max(0) as u64;
        self.settings = self.settings.sanitized();
        self
    }

    /// Configure how long `stop()` waits for the pump thread (ms).
    pub fn stop_join_timeout_ms(mut self, ms: i64) -> Self {
        self.settings.stop_join_timeout_ms = ms.max(0) as u64;
        self
    }

    /// Configure the graceful pipeline shutdown wait (ms).
    pub fn pipeline_shutdown_ms(mut self, ms: i64) -> Self {
        self.settings.pipeline_shutdown_ms = ms.max(0) as u64;
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::delivery::Delivery;
    use crate::source::synthetic::{SyntheticConfig, SyntheticSource};
    use crate::source::FrameSource;

    use super::super::Player;

    fn builder() -> super::PlayerBuilder {
        Player::builder(
            || Box::new(SyntheticSource::new(SyntheticConfig::default())) as Box<dyn FrameSource + Send>,
            Delivery::new(|_, _| Ok(())),
        )
    }

    #[test]
    fn negative_values_clamp_to_zero() {
        let player = builder()
            .min_video_delay_ms(-5)
            .warmup_poll_ms(-1)
            .stop_join_timeout_ms(-100)
            .build();
        assert_eq!(player.settings().min_video_delay_ms, 0);
        assert_eq!(player.settings().warmup_poll_ms, 0);
        assert_eq!(player.settings().stop_join_timeout_ms, 0);
    }

    #[test]
    fn zero_read_ahead_keeps_default() {
        let player = builder().max_read_ahead_ms(0).audio_buffer_ms(-3).build();
        assert_eq!(player.settings().max_read_ahead_ms, 700);
        assert_eq!(player.settings().audio_buffer_ms, 750);

        let player = builder().max_read_ahead_ms(250).build();
        assert_eq!(player.settings().max_read_ahead_ms, 250);
    }
}
