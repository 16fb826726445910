//! Pump-thread bootstrap for `Player`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use log::warn;

use crate::playback::session::Session;

use super::super::Player;
use super::worker::{run_pump_thread, PumpContext};

impl Player {
    /// Create a session with a fresh source and spawn its pump thread.
    pub(in crate::playback::player) fn spawn_pump(
        &self,
        locator: &str,
    ) -> std::io::Result<Arc<Session>> {
        let session_id = self.session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let source = (self.source_factory)();
        let session = Arc::new(Session::new(session_id, self.settings, source));

        let context = PumpContext {
            session: session.clone(),
            locator: locator.to_string(),
            sink_provider: self.sink_provider.clone(),
            delivery: self.delivery.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("framepace-pump-{}", session_id))
            .spawn(move || run_pump_thread(context))?;
        session.register_thread(handle.thread().id());
        *self.pump_thread.lock().unwrap() = Some(handle);
        Ok(session)
    }

    /// Join the previous pump thread if it has exited, detach it otherwise.
    pub(in crate::playback::player) fn join_pump_thread(&self) {
        let Some(handle) = self.pump_thread.lock().unwrap().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            warn!("stop called from the pump thread; skipping join");
        } else if !handle.is_finished() {
            warn!("detaching pump thread that is still running");
        } else if handle.join().is_err() {
            warn!("pump thread panicked during join");
        }
    }
}
