//! Error types for outcall.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutcallError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Call lifecycle errors
    #[error("A call is already in progress")]
    CallInProgress,

    #[error("Lead not found: {id}")]
    LeadNotFound { id: String },

    // Audio capture errors
    #[error("Microphone permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Streaming session errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Payload errors (recoverable per message)
    #[error("Decode error: {message}")]
    Decode { message: String },

    // Lead extraction / document processing errors
    #[error("Extraction failed: {message}")]
    Extraction { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, OutcallError>;

/// Trait for reporting recoverable errors.
///
/// Used for per-message failures (bad audio payloads, playback hiccups)
/// that are skipped rather than ending the call.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error with the context it occurred in.
    fn report(&self, context: &str, error: &OutcallError);
}

/// Simple error reporter that logs to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, context: &str, error: &OutcallError) {
        eprintln!("outcall: {}: {}", context, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_denied_display() {
        let error = OutcallError::PermissionDenied {
            message: "user declined".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Microphone permission denied: user declined"
        );
    }

    #[test]
    fn test_audio_device_not_found_display() {
        let error = OutcallError::AudioDeviceNotFound {
            device: "default".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device not found: default");
    }

    #[test]
    fn test_transport_display() {
        let error = OutcallError::Transport {
            message: "session closed unexpectedly".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transport error: session closed unexpectedly"
        );
    }

    #[test]
    fn test_decode_display() {
        let error = OutcallError::Decode {
            message: "invalid padding".to_string(),
        };
        assert_eq!(error.to_string(), "Decode error: invalid padding");
    }

    #[test]
    fn test_extraction_display() {
        let error = OutcallError::Extraction {
            message: "failed to process PDF".to_string(),
        };
        assert_eq!(error.to_string(), "Extraction failed: failed to process PDF");
    }

    #[test]
    fn test_call_in_progress_display() {
        assert_eq!(
            OutcallError::CallInProgress.to_string(),
            "A call is already in progress"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: OutcallError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: OutcallError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_log_reporter() {
        let reporter = LogReporter;
        let error = OutcallError::Decode {
            message: "test error".to_string(),
        };
        // Just ensure it doesn't panic
        reporter.report("audio", &error);
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<OutcallError>();
        assert_sync::<OutcallError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
