//! Lifecycle operations for `Player`.
//!
//! `start()` spawns a pump thread for a new session; `stop()` cancels it,
//! waits a bounded time for the thread, and then tears the session down
//! whether or not the thread exited.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::delivery::PlayerEvent;
use crate::error::PlayerError;

use super::{Player, PumpState, SessionStats};

const STOP_POLL_MS: u64 = 10;

impl Player {
    /// Open `locator` and begin paced playback.
    ///
    /// Returns `false` when a session is still alive (the call is ignored) or
    /// the pump thread could not be spawned.
    pub fn start(&self, locator: &str) -> bool {
        let mut current = self.session.lock().unwrap();
        if let Some(session) = current.as_ref() {
            if !session.pump_finished() {
                warn!(
                    "start({}) ignored: session {} is still running",
                    locator,
                    session.id()
                );
                return false;
            }
        }
        self.join_pump_thread();

        match self.spawn_pump(locator) {
            Ok(session) => {
                info!("session {} started for {}", session.id(), locator);
                *current = Some(session);
                true
            }
            Err(err) => {
                let err = PlayerError::Spawn(err);
                error!("{}", err);
                self.delivery.emit(PlayerEvent::error(err));
                false
            }
        }
    }

    /// Stop the current session and release its resources.
    ///
    /// Waits up to `stop_join_timeout_ms` for the pump thread before tearing
    /// down the sink, the source, and both pipelines. Called from a consumer,
    /// it only cancels the session and returns.
    pub fn stop(&self) {
        let session = self.session.lock().unwrap().clone();
        let Some(session) = session else {
            return;
        };
        if session.pump_finished() {
            self.join_pump_thread();
            return;
        }

        info!("stopping session {}", session.id());
        session.cancellation().cancel();

        // Consumers run on the pump and pipeline threads. Waiting there would
        // block the pump on itself; its exit guard finishes the teardown.
        if session.runs_on_current_thread() {
            debug!(
                "stop requested from a thread of session {}; teardown continues on the pump",
                session.id()
            );
            return;
        }

        let deadline = Instant::now() + self.settings.stop_join_timeout();
        while !session.pump_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(STOP_POLL_MS));
        }
        if !session.pump_finished() {
            warn!(
                "pump thread of session {} did not exit within {:?}; tearing down anyway",
                session.id(),
                self.settings.stop_join_timeout()
            );
        }

        session.teardown();
        session.set_state(PumpState::Stopped);
        self.join_pump_thread();
    }

    /// Return true while a session's pump thread is alive.
    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| !session.pump_finished())
            .unwrap_or(false)
    }

    /// Pump state of the current (or last) session.
    pub fn state(&self) -> PumpState {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.state())
            .unwrap_or(PumpState::Idle)
    }

    pub fn stats(&self) -> SessionStats {
        self.session
            .lock()
            .unwrap()
            .as_ref()
            .map(|session| session.stats())
            .unwrap_or_default()
    }

    /// Block until the pump thread exits or `timeout` passes.
    ///
    /// Returns `true` when no session is running anymore.
    pub fn wait_until_finished(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if !self.is_running() {
                self.join_pump_thread();
                return true;
            }
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                return false;
            }
            thread::sleep(Duration::from_millis(STOP_POLL_MS));
        }
    }
}
