//! Diagnostics helpers for observing a running player.

pub mod reporter;
