//! Logging infrastructure for console output and the repository log file.
//!
//! Everything goes through [`tracing`]. Stage headers and transcript lines use
//! dedicated targets so the console formatter can style them; the
//! [`FileLayer`] writes every event to `dotman.log` with a timestamp prefix.

mod subscriber;
mod utils;

pub use subscriber::{FileLayer, init_subscriber};

use crate::transcript::TranscriptSink;

/// Target used for stage headers (`==> …`).
pub const STAGE_TARGET: &str = "dotman::stage";

/// Target used for transcript lines forwarded from the engine.
pub const TRANSCRIPT_TARGET: &str = "dotman::transcript";

/// Log a stage header (major section).
pub fn stage(msg: &str) {
    tracing::info!(target: "dotman::stage", "{msg}");
}

/// Build a transcript sink that forwards each line to the logging pipeline.
#[must_use]
pub fn transcript_sink() -> TranscriptSink {
    std::sync::Arc::new(|line: &str| {
        tracing::info!(target: "dotman::transcript", "{line}");
    })
}
