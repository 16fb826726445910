//! Playback orchestration: dispatch pipelines, sessions, and the player.

pub mod pipeline;
pub mod player;

mod handlers;
mod session;
