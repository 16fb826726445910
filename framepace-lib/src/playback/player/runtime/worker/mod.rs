//! Pump worker internals.
//!
//! - [`context`] defines the state captured at spawn time.
//! - [`guard`] tears the session down on every exit path.
//! - [`warmup`] primes the audio device before the pump loop.
//! - [`runner`] executes the pump loop with backpressure.

mod context;
mod guard;
mod runner;
mod warmup;

pub(in crate::playback::player::runtime) use context::PumpContext;
pub(in crate::playback::player::runtime) use runner::run_pump_thread;
