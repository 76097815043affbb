//! Error types for voxflow.

use thiserror::Error;

use crate::transcription::client::TranscribeError;

#[derive(Error, Debug)]
pub enum VoxflowError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Unknown language code: {code}")]
    InvalidLanguage { code: String },

    #[error("Missing API credential: set {var}")]
    MissingCredential { var: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio errors
    #[error("Audio initialization failed: {message}")]
    AudioInit { message: String },

    #[error("Audio device error: {message}")]
    DeviceRuntime { message: String },

    // Transcription errors
    #[error("Transcription failed: {0}")]
    Transcribe(#[from] TranscribeError),

    // Pipeline wiring errors
    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_audio_init_display() {
        let error = VoxflowError::AudioInit {
            message: "no input device".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio initialization failed: no input device"
        );
    }

    #[test]
    fn test_device_runtime_display() {
        let error = VoxflowError::DeviceRuntime {
            message: "stream start failed".to_string(),
        };
        assert_eq!(error.to_string(), "Audio device error: stream start failed");
    }

    #[test]
    fn test_invalid_language_display() {
        let error = VoxflowError::InvalidLanguage {
            code: "xx".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown language code: xx");
    }

    #[test]
    fn test_missing_credential_display() {
        let error = VoxflowError::MissingCredential {
            var: "OPENAI_API_KEY".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Missing API credential: set OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = VoxflowError::ConfigInvalidValue {
            key: "audio.latency_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for audio.latency_ms: must be positive"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: VoxflowError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_toml_error() {
        let toml_str = "invalid = toml = syntax";
        let toml_error = toml::from_str::<toml::Value>(toml_str).unwrap_err();
        let error: VoxflowError = toml_error.into();
        assert!(error.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_from_transcribe_error_preserves_retryability() {
        let error: VoxflowError = TranscribeError::Transport("connection reset".to_string()).into();
        match error {
            VoxflowError::Transcribe(e) => assert!(e.is_retryable()),
            _ => panic!("Expected Transcribe variant"),
        }
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VoxflowError>();
        assert_sync::<VoxflowError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
