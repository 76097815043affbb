//! voxflow - real-time voice capture and streaming transcription
//!
//! Push-to-talk or continuous VAD-gated microphone capture, dual overlapping
//! buffering, remote speech-to-text over HTTP, and timestamp-based
//! reconciliation into a monotonically growing transcript.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod input;
pub mod session;
pub mod transcription;

// Core pipeline surface
pub use audio::{AudioOptions, CaptureStream, VadConfig, VadEvent, VoiceActivityDetector};
pub use session::{SessionMode, VoiceSession};
pub use transcription::{
    AudioChunk, BufferManager, Language, SpeechToText, TextReconciler, TextSegment,
    TranscribeError, TranscriptionServer, UpdateCallback, WhisperApiClient,
};

// Error handling
pub use error::{Result, VoxflowError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.2+abc1234"` when git hash is available, `"0.1.2"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }
}
