//! Audio buffer managers feeding the transcription workers.
//!
//! Two parametrizations run in parallel on the same stream: a primary
//! windowed buffer (short windows, low latency) and a secondary windowed
//! buffer (long windows, more context). A third, simple variant emits one
//! chunk per explicit flush and is used for push-to-talk capture.
//!
//! Chunks travel over a bounded channel; when the remote service falls
//! behind, `add` drops the cut chunk (counted, logged at warn) instead of
//! blocking the audio path.

use crate::audio::device::AudioOptions;
use crate::defaults;
use crate::transcription::types::AudioChunk;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Cutting strategy of a buffer manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferKind {
    /// Time-sliced windows with a trailing overlap carried into the next cut.
    Windowed { overlap: Duration },
    /// No cutting; one chunk per explicit flush, short buffers dropped.
    Simple,
}

impl BufferKind {
    fn overlap(&self) -> Duration {
        match self {
            BufferKind::Windowed { overlap } => *overlap,
            BufferKind::Simple => Duration::ZERO,
        }
    }
}

struct BufferState {
    buf: Vec<u8>,
    base_offset: Duration,
}

/// Accumulates PCM16LE and emits timestamped [`AudioChunk`]s.
pub struct BufferManager {
    options: AudioOptions,
    min_window: Duration,
    kind: BufferKind,
    state: Mutex<BufferState>,
    tx: Mutex<Option<mpsc::Sender<AudioChunk>>>,
    rx: Mutex<Option<mpsc::Receiver<AudioChunk>>>,
    dropped: AtomicU64,
}

impl BufferManager {
    /// Create a manager with an explicit strategy and channel capacity.
    pub fn new(
        options: AudioOptions,
        min_window: Duration,
        kind: BufferKind,
        channel_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(channel_capacity);
        Self {
            options,
            min_window,
            kind,
            state: Mutex::new(BufferState {
                buf: Vec::new(),
                base_offset: Duration::ZERO,
            }),
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Primary windowed buffer: 500ms windows, 100ms overlap.
    pub fn primary(options: AudioOptions) -> Self {
        Self::new(
            options,
            Duration::from_millis(defaults::PRIMARY_MIN_WINDOW_MS),
            BufferKind::Windowed {
                overlap: Duration::from_millis(defaults::PRIMARY_OVERLAP_MS),
            },
            defaults::CHUNK_CHANNEL_CAPACITY,
        )
    }

    /// Secondary windowed buffer: 2s windows, 400ms overlap.
    pub fn secondary(options: AudioOptions) -> Self {
        Self::new(
            options,
            Duration::from_millis(defaults::SECONDARY_MIN_WINDOW_MS),
            BufferKind::Windowed {
                overlap: Duration::from_millis(defaults::SECONDARY_OVERLAP_MS),
            },
            defaults::CHUNK_CHANNEL_CAPACITY,
        )
    }

    /// Simple push-to-talk buffer: one chunk per flush, short takes dropped.
    pub fn simple(options: AudioOptions, min_window: Duration) -> Self {
        Self::new(
            options,
            min_window,
            BufferKind::Simple,
            defaults::CHUNK_CHANNEL_CAPACITY,
        )
    }

    /// Append PCM; the windowed variants cut a chunk once `min_window` of
    /// audio is buffered. Never blocks.
    pub fn add(&self, pcm: &[u8]) {
        let mut state = self.lock_state();
        state.buf.extend_from_slice(pcm);

        if let BufferKind::Windowed { overlap } = self.kind {
            let duration_now = self.options.duration_of(state.buf.len());
            if duration_now >= self.min_window {
                self.cut(&mut state, duration_now, overlap);
            }
        }
    }

    /// Emit whatever is buffered as one chunk.
    ///
    /// The simple variant drops buffers shorter than `min_window` instead of
    /// emitting them. `is_final` marks the chunk as closing an utterance.
    pub fn flush(&self, is_final: bool) {
        let mut state = self.lock_state();
        if state.buf.is_empty() {
            return;
        }

        let duration = self.options.duration_of(state.buf.len());
        let pcm = std::mem::take(&mut state.buf);
        let start = state.base_offset;
        state.base_offset += duration;

        if self.kind == BufferKind::Simple && duration < self.min_window {
            debug!(?duration, "dropping short take");
            return;
        }

        self.send(AudioChunk {
            pcm,
            start,
            end: start + duration,
            is_final,
        });
    }

    /// Take the chunk receiver. Yields each chunk in FIFO order and closes
    /// after [`close`](Self::close). Can be taken once; later calls get None.
    pub fn chunks(&self) -> Option<mpsc::Receiver<AudioChunk>> {
        self.rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Discard buffered audio and rewind the timeline to zero.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.buf.clear();
        state.base_offset = Duration::ZERO;
    }

    /// True when the buffer holds no more than one overlap's worth of audio.
    pub fn is_empty(&self) -> bool {
        let state = self.lock_state();
        state.buf.len() <= self.options.bytes_for(self.kind.overlap())
    }

    /// Close the chunk channel. Buffered audio is discarded; the receiver
    /// drains whatever was already enqueued and then ends.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.reset();
    }

    /// Chunks dropped because the channel was full.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Cut a window: emit the whole buffer, keep the trailing overlap, and
    /// advance the timeline by the non-overlapped span.
    fn cut(&self, state: &mut BufferState, duration_now: Duration, overlap: Duration) {
        let chunk = AudioChunk {
            pcm: state.buf.clone(),
            start: state.base_offset,
            end: state.base_offset + duration_now,
            is_final: false,
        };
        self.send(chunk);

        let overlap_bytes = self.options.bytes_for(overlap).min(state.buf.len());
        let keep_from = state.buf.len() - overlap_bytes;
        state.buf.drain(..keep_from);
        state.base_offset += duration_now.saturating_sub(overlap);
    }

    fn send(&self, chunk: AudioChunk) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            return; // closed
        };
        if tx.try_send(chunk).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(total, "chunk channel full, dropping window");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_16k() -> AudioOptions {
        AudioOptions::with_default_latency(16000).unwrap()
    }

    /// PCM16LE of `ms` milliseconds at 16kHz mono.
    fn pcm_ms(ms: u64) -> Vec<u8> {
        vec![0u8; (32 * ms) as usize]
    }

    fn windowed_500_100() -> BufferManager {
        BufferManager::new(
            options_16k(),
            Duration::from_millis(500),
            BufferKind::Windowed {
                overlap: Duration::from_millis(100),
            },
            defaults::CHUNK_CHANNEL_CAPACITY,
        )
    }

    #[test]
    fn cut_emits_full_window_and_retains_overlap() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(600));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.start, Duration::ZERO);
        assert_eq!(chunk.end, Duration::from_millis(600));
        assert_eq!(chunk.pcm.len(), 19200); // 600ms at 32 bytes/ms
        assert!(!chunk.is_final);

        // Next window starts at duration_now - overlap = 500ms.
        manager.add(&pcm_ms(500));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.start, Duration::from_millis(500));
        assert_eq!(chunk.end, Duration::from_millis(1100));
    }

    #[test]
    fn short_pushes_accumulate_until_min_window() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(200));
        manager.add(&pcm_ms(200));
        assert!(rx.try_recv().is_err());

        manager.add(&pcm_ms(200));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.end, Duration::from_millis(600));
    }

    #[test]
    fn add_never_blocks_when_channel_is_full() {
        let manager = BufferManager::new(
            options_16k(),
            Duration::from_millis(500),
            BufferKind::Windowed {
                overlap: Duration::from_millis(100),
            },
            2,
        );
        let mut rx = manager.chunks().unwrap();

        for _ in 0..5 {
            manager.add(&pcm_ms(500));
        }

        // Two chunks fit, the rest were dropped rather than queued.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.dropped_chunks(), 3);
    }

    #[test]
    fn flush_emits_residual_with_final_flag() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(300));
        manager.flush(true);

        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.start, Duration::ZERO);
        assert_eq!(chunk.end, Duration::from_millis(300));
        assert!(chunk.is_final);
    }

    #[test]
    fn flush_on_empty_buffer_emits_nothing() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();
        manager.flush(true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn flush_advances_timeline() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(300));
        manager.flush(false);
        manager.add(&pcm_ms(300));
        manager.flush(true);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.end, Duration::from_millis(300));
        assert_eq!(second.start, Duration::from_millis(300));
        assert_eq!(second.end, Duration::from_millis(600));
    }

    #[test]
    fn simple_variant_drops_short_takes() {
        let manager = BufferManager::simple(options_16k(), Duration::from_millis(500));
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(300));
        manager.flush(true);
        assert!(rx.try_recv().is_err());

        manager.add(&pcm_ms(800));
        manager.flush(true);
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.duration(), Duration::from_millis(800));
    }

    #[test]
    fn simple_variant_never_cuts_on_add() {
        let manager = BufferManager::simple(options_16k(), Duration::from_millis(500));
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(3000));
        assert!(rx.try_recv().is_err());

        manager.flush(true);
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.duration(), Duration::from_millis(3000));
    }

    #[test]
    fn is_empty_tolerates_overlap_residue() {
        let manager = windowed_500_100();
        let _rx = manager.chunks().unwrap();

        assert!(manager.is_empty());
        manager.add(&pcm_ms(600));
        // Only the 100ms overlap remains after the cut.
        assert!(manager.is_empty());
        manager.add(&pcm_ms(50));
        assert!(!manager.is_empty());
    }

    #[test]
    fn reset_rewinds_timeline() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(600));
        rx.try_recv().unwrap();
        manager.reset();

        manager.add(&pcm_ms(600));
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.start, Duration::ZERO);
    }

    #[test]
    fn chunks_can_only_be_taken_once() {
        let manager = windowed_500_100();
        assert!(manager.chunks().is_some());
        assert!(manager.chunks().is_none());
    }

    #[tokio::test]
    async fn close_ends_the_chunk_stream_after_draining() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();

        manager.add(&pcm_ms(600));
        manager.close();

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn add_after_close_is_a_quiet_noop() {
        let manager = windowed_500_100();
        let mut rx = manager.chunks().unwrap();
        manager.close();
        manager.add(&pcm_ms(600));
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.dropped_chunks(), 0);
    }
}
