//! Configuration loading and validation.

use crate::defaults;
use crate::error::{Result, VoxflowError};
use crate::transcription::language::Language;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub voice: VoiceConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
}

/// Voice capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// When false the voice pipeline is not started at all.
    pub enabled: bool,
    /// Raw platform code of the push-to-talk key.
    pub key_code: u16,
    /// Optional language hint (ISO 639-1-like code).
    pub language: Option<String>,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Target duration of one device callback, in milliseconds.
    pub latency_ms: u64,
}

/// Remote speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Gap below which adjacent transcript segments merge, in milliseconds.
    pub merge_gap_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_code: defaults::PTT_KEY_CODE,
            language: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            latency_ms: defaults::LATENCY_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::STT_BASE_URL.to_string(),
            model: defaults::STT_MODEL.to_string(),
            timeout_secs: defaults::STT_TIMEOUT_SECS,
            merge_gap_ms: defaults::MERGE_GAP_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from a file, falling back to defaults only when the file is
    /// missing. Invalid TOML still fails.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXFLOW_LANGUAGE → voice.language
    /// - VOXFLOW_STT_BASE_URL → stt.base_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("VOXFLOW_LANGUAGE")
            && !language.is_empty()
        {
            self.voice.language = Some(language);
        }

        if let Ok(base_url) = std::env::var("VOXFLOW_STT_BASE_URL")
            && !base_url.is_empty()
        {
            self.stt.base_url = base_url;
        }

        self
    }

    /// Validate cross-field constraints, returning the parsed language hint.
    pub fn validate(&self) -> Result<Option<Language>> {
        if self.audio.latency_ms == 0 {
            return Err(VoxflowError::ConfigInvalidValue {
                key: "audio.latency_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.stt.timeout_secs == 0 {
            return Err(VoxflowError::ConfigInvalidValue {
                key: "stt.timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }

        self.voice
            .language
            .as_deref()
            .map(Language::parse)
            .transpose()
    }

    /// The STT API credential from the environment.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(defaults::CREDENTIAL_ENV) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(VoxflowError::MissingCredential {
                var: defaults::CREDENTIAL_ENV.to_string(),
            }),
        }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.audio.latency_ms)
    }

    pub fn stt_timeout(&self) -> Duration {
        Duration::from_secs(self.stt.timeout_secs)
    }

    pub fn merge_gap(&self) -> Duration {
        Duration::from_millis(self.stt.merge_gap_ms)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxflow/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxflow")
            .join("config.toml")
    }
}
