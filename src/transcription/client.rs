//! Remote speech-to-text client.
//!
//! [`SpeechToText`] is the seam the transcription server works against;
//! [`WhisperApiClient`] is the production implementation, speaking the
//! OpenAI-compatible `audio/transcriptions` multipart protocol.

use crate::audio::codec;
use crate::audio::device::AudioOptions;
use crate::defaults;
use crate::transcription::language::Language;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure modes of a single transcription call.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("transcription timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl TranscribeError {
    /// Whether retrying the same chunk could plausibly succeed.
    ///
    /// Timeouts, transport failures, and 5xx responses are retryable;
    /// 4xx responses and malformed bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TranscribeError::Timeout(_) | TranscribeError::Transport(_) => true,
            TranscribeError::Api { status, .. } => *status >= 500,
            TranscribeError::Malformed(_) => false,
        }
    }
}

/// Backend interface for turning PCM16LE audio into text.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe one window of PCM16LE audio. An empty transcript is a
    /// valid result (silence, music).
    async fn transcribe(&self, pcm: &[u8]) -> Result<String, TranscribeError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for an OpenAI-compatible Whisper transcription endpoint.
pub struct WhisperApiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    language: Option<Language>,
    options: AudioOptions,
    timeout: Duration,
}

impl WhisperApiClient {
    /// Create a client with the default endpoint, model, and timeout.
    pub fn new(api_key: impl Into<String>, options: AudioOptions) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: defaults::STT_BASE_URL.to_string(),
            model: defaults::STT_MODEL.to_string(),
            api_key: api_key.into(),
            language: None,
            options,
            timeout: Duration::from_secs(defaults::STT_TIMEOUT_SECS),
        }
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the language hint sent with every request.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Bound the wall-clock time of a single call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        )
    }

    async fn post_wav(&self, wav: Vec<u8>) -> Result<String, TranscribeError> {
        let file_part = Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Malformed(format!("audio part: {}", e)))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = self.language {
            form = form.text("language", language.code());
        }

        let url = self.endpoint();
        debug!(%url, "sending transcription request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscribeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(TranscribeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::Malformed(e.to_string()))?;
        Ok(body.text)
    }
}

#[async_trait]
impl SpeechToText for WhisperApiClient {
    async fn transcribe(&self, pcm: &[u8]) -> Result<String, TranscribeError> {
        if pcm.is_empty() {
            return Ok(String::new());
        }

        let wav = codec::wav_from_pcm16le(
            pcm,
            self.options.sample_rate_hz,
            self.options.channels,
            self.options.bits_per_sample,
        );

        match tokio::time::timeout(self.timeout, self.post_wav(wav)).await {
            Ok(result) => result,
            Err(_) => Err(TranscribeError::Timeout(self.timeout)),
        }
    }
}
