//! Exit guard for pump threads.

use std::sync::Arc;
use std::thread;

use log::error;

use crate::delivery::{Delivery, PlayerEvent};
use crate::playback::session::Session;

use super::super::super::PumpState;

/// Tears the session down and marks the pump finished when dropped, including
/// while unwinding from a panic.
pub(super) struct PumpThreadGuard {
    session: Arc<Session>,
    delivery: Delivery,
}

impl PumpThreadGuard {
    pub(super) fn new(session: Arc<Session>, delivery: Delivery) -> Self {
        Self { session, delivery }
    }
}

impl Drop for PumpThreadGuard {
    fn drop(&mut self) {
        self.session.cancellation().cancel();
        self.session.teardown();
        self.session.set_state(PumpState::Stopped);
        if thread::panicking() {
            error!("pump thread of session {} panicked", self.session.id());
            self.delivery.emit(PlayerEvent::Error {
                message: "pump thread panicked".to_string(),
                cause: None,
            });
        }
        self.session.mark_pump_finished();
    }
}
