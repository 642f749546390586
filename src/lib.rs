//! outcall - Outbound sales-call assistant
//!
//! Real-time audio and transcript pipeline for agent-led customer calls.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod codec;
pub mod config;
pub mod defaults;
pub mod error;
pub mod leads;
pub mod report;
pub mod session;
pub mod transcript;

// Core traits (source → session → sink)
pub use audio::playback::PlaybackSink;
pub use audio::source::CaptureSource;
pub use session::stream::{SpeechService, SpeechStream};

// Session
pub use session::{CallController, CallState, StreamConfig};

// Error handling
pub use error::{ErrorReporter, LogReporter, OutcallError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
