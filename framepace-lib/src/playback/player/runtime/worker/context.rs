//! Shared runtime context captured at thread spawn time.

use std::sync::Arc;

use crate::delivery::Delivery;
use crate::playback::session::Session;
use crate::sink::SinkProvider;

/// State moved from `Player::spawn_pump` into the pump thread.
pub(in crate::playback::player::runtime) struct PumpContext {
    pub(in crate::playback::player::runtime) session: Arc<Session>,
    pub(in crate::playback::player::runtime) locator: String,
    pub(in crate::playback::player::runtime) sink_provider: Option<Arc<dyn SinkProvider>>,
    pub(in crate::playback::player::runtime) delivery: Delivery,
}
