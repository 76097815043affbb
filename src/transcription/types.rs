//! Data types shared across the transcription pipeline.

use std::time::Duration;

/// A window of PCM16LE audio cut from a buffer manager, stamped with its
/// position on the session timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Raw 16-bit little-endian PCM, mono.
    pub pcm: Vec<u8>,
    /// Offset of the first sample from the start of the session.
    pub start: Duration,
    /// Offset just past the last sample.
    pub end: Duration,
    /// True when this chunk closes an utterance; interim windows are false.
    pub is_final: bool,
}

impl AudioChunk {
    /// Duration covered by this chunk.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// A transcribed span of text anchored to the audio timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub text: String,
    pub start: Duration,
    pub end: Duration,
}
