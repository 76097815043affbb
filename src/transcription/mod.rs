//! Streaming transcription: buffering, the remote STT client, and
//! transcript reconciliation.

pub mod buffer;
pub mod client;
pub mod language;
pub mod reconciler;
pub mod server;
pub mod types;

pub use buffer::{BufferKind, BufferManager};
pub use client::{SpeechToText, TranscribeError, WhisperApiClient};
pub use language::Language;
pub use reconciler::TextReconciler;
pub use server::{TranscriptionServer, UpdateCallback};
pub use types::{AudioChunk, TextSegment};
