//! Pump thread plumbing for `Player`.
//!
//! - [`thread`] builds the session and spawns the pump thread.
//! - [`worker`] runs warm-up, the pump loop, and exit handling.

mod thread;
mod worker;
