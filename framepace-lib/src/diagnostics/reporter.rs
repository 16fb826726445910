//! Periodic playback state reporter.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::playback::player::{Player, PumpState};

/// Snapshot of playback progress sent to report consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub state: PumpState,
    pub elapsed_ms: i64,
    pub clock_active: bool,
    pub video_delivered: u64,
    pub audio_delivered: u64,
}

impl PlaybackReport {
    fn capture(player: &Player) -> Self {
        let stats = player.stats();
        Self {
            state: stats.state,
            elapsed_ms: stats.elapsed_us / 1000,
            clock_active: stats.clock_active,
            video_delivered: stats.video.delivered,
            audio_delivered: stats.audio.delivered,
        }
    }
}

/// Background reporter that polls a [`Player`] at fixed intervals and calls
/// back whenever the snapshot changes.
#[derive(Clone)]
pub struct Reporter {
    player: Player,
    report: Arc<Mutex<dyn Fn(PlaybackReport) + Send>>,
    interval: Duration,
    finish: Arc<AtomicBool>,
    thread_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Reporter {
    /// Create a new reporter for the given player and callback.
    pub fn new(
        player: Player,
        report: Arc<Mutex<dyn Fn(PlaybackReport) + Send>>,
        interval: Duration,
    ) -> Self {
        Self {
            player,
            report,
            interval,
            finish: Arc::new(AtomicBool::new(false)),
            thread_handle: Arc::new(Mutex::new(None)),
        }
    }

    fn run(&self) {
        let mut last_report: Option<PlaybackReport> = None;

        loop {
            let report = PlaybackReport::capture(&self.player);

            if last_report.as_ref() != Some(&report) {
                (*self.report.lock().unwrap())(report.clone());
                last_report = Some(report);
            }

            if self.finish.load(Ordering::Relaxed) {
                break;
            }

            std::thread::sleep(self.interval);
        }
    }

    /// Start the background reporting thread.
    pub fn start(&self) {
        self.stop();
        self.finish.store(false, Ordering::Relaxed);
        let this = self.clone();
        let handle = std::thread::spawn(move || this.run());
        *self.thread_handle.lock().unwrap() = Some(handle);
    }

    /// Stop the background reporting thread after one final report.
    pub fn stop(&self) {
        self.finish.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.lock().unwrap().take() {
            if handle.thread().id() == std::thread::current().id() {
                log::warn!("reporter stop called from reporter thread; skipping join");
            } else if handle.join().is_err() {
                log::warn!("reporter thread panicked during join");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Delivery;
    use crate::source::synthetic::{SyntheticConfig, SyntheticSource};
    use crate::source::FrameSource;

    #[test]
    fn reports_idle_player_once() {
        let player = Player::builder(
            || Box::new(SyntheticSource::new(SyntheticConfig::default())) as Box<dyn FrameSource + Send>,
            Delivery::new(|_, _| Ok(())),
        )
        .build();
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let reporter = Reporter::new(
            player,
            Arc::new(Mutex::new(move |report: PlaybackReport| {
                sink.lock().unwrap().push(report)
            })),
            Duration::from_millis(5),
        );

        reporter.start();
        std::thread::sleep(Duration::from_millis(30));
        reporter.stop();

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, PumpState::Idle);
        assert_eq!(reports[0].video_delivered, 0);
    }
}
