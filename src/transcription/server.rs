//! Transcription orchestration.
//!
//! [`TranscriptionServer`] wires the buffer managers to the speech-to-text
//! backend and the reconciler. One worker task drains each buffer's chunk
//! channel; every chunk is transcribed in a transient task gated by a shared
//! semaphore, so sustained speech never fans out into unbounded concurrent
//! requests. Out-of-order completion is expected; the reconciler's
//! timestamped merge restores transcript order.

use crate::defaults;
use crate::error::{Result, VoxflowError};
use crate::transcription::buffer::BufferManager;
use crate::transcription::client::SpeechToText;
use crate::transcription::reconciler::TextReconciler;
use crate::transcription::types::AudioChunk;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked after each successful transcription with the combined
/// text so far and whether more interim results are expected.
pub type UpdateCallback = Arc<dyn Fn(String, bool) + Send + Sync>;

pub struct TranscriptionServer {
    primary: Arc<BufferManager>,
    secondary: Option<Arc<BufferManager>>,
    backend: Arc<dyn SpeechToText>,
    reconciler: Arc<TextReconciler>,
    on_update: UpdateCallback,
    pool: Arc<Semaphore>,
    pool_size: usize,
    closed: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TranscriptionServer {
    /// Assemble a server from its injected parts.
    pub fn new(
        primary: Arc<BufferManager>,
        secondary: Option<Arc<BufferManager>>,
        backend: Arc<dyn SpeechToText>,
        reconciler: Arc<TextReconciler>,
        on_update: UpdateCallback,
    ) -> Self {
        let pool_size = defaults::MAX_CONCURRENT_TRANSCRIPTIONS;
        Self {
            primary,
            secondary,
            backend,
            reconciler,
            on_update,
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            closed: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Override the concurrent-request bound (default 2).
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool = Arc::new(Semaphore::new(pool_size));
        self.pool_size = pool_size;
        self
    }

    /// Spawn one worker per configured buffer.
    ///
    /// # Errors
    /// Returns `Pipeline` when a buffer's chunk receiver was already taken.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.lock_workers();
        if !workers.is_empty() {
            return Ok(());
        }

        let mut receivers = Vec::new();
        receivers.push(self.take_chunks(&self.primary)?);
        if let Some(secondary) = &self.secondary {
            receivers.push(self.take_chunks(secondary)?);
        }

        for rx in receivers {
            workers.push(tokio::spawn(run_worker(
                rx,
                Arc::clone(&self.backend),
                Arc::clone(&self.reconciler),
                Arc::clone(&self.on_update),
                Arc::clone(&self.pool),
                Arc::clone(&self.closed),
            )));
        }
        debug!(workers = workers.len(), "transcription server started");
        Ok(())
    }

    /// Forward PCM to every configured buffer.
    pub fn add_audio(&self, pcm: &[u8]) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.primary.add(pcm);
        if let Some(secondary) = &self.secondary {
            secondary.add(pcm);
        }
    }

    /// Flush the primary buffer for a fast interim result.
    pub fn flush_primary(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.primary.flush(false);
    }

    /// Flush every buffer, marking the chunks as utterance-final.
    pub fn flush_buffers(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.primary.flush(true);
        if let Some(secondary) = &self.secondary {
            secondary.flush(true);
        }
    }

    /// Discard buffered audio and pending transcript segments.
    pub fn reset(&self) {
        self.primary.reset();
        if let Some(secondary) = &self.secondary {
            secondary.reset();
        }
        self.reconciler.reset();
    }

    /// Shut down: close the chunk channels, await the workers, and wait for
    /// in-flight transcriptions to settle.
    ///
    /// After this returns no callback fires; tasks that were mid-request
    /// observe the closed flag and drop their result.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.primary.close();
        if let Some(secondary) = &self.secondary {
            secondary.close();
        }

        let workers = std::mem::take(&mut *self.lock_workers());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("transcription worker panicked: {}", e);
            }
        }

        // Every transient task holds a permit; reacquiring the full pool
        // means they have all finished.
        if let Ok(permits) = self.pool.acquire_many(self.pool_size as u32).await {
            drop(permits);
        }
        debug!("transcription server closed");
    }

    fn take_chunks(&self, buffer: &BufferManager) -> Result<mpsc::Receiver<AudioChunk>> {
        buffer.chunks().ok_or_else(|| VoxflowError::Pipeline {
            message: "buffer chunk stream already taken".to_string(),
        })
    }

    fn lock_workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drain one buffer's chunk channel until it closes.
async fn run_worker(
    mut chunks: mpsc::Receiver<AudioChunk>,
    backend: Arc<dyn SpeechToText>,
    reconciler: Arc<TextReconciler>,
    on_update: UpdateCallback,
    pool: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
) {
    while let Some(chunk) = chunks.recv().await {
        if chunk.pcm.is_empty() || closed.load(Ordering::Acquire) {
            continue;
        }

        let Ok(permit) = Arc::clone(&pool).acquire_owned().await else {
            return;
        };

        let backend = Arc::clone(&backend);
        let reconciler = Arc::clone(&reconciler);
        let on_update = Arc::clone(&on_update);
        let closed = Arc::clone(&closed);
        tokio::spawn(async move {
            let result = backend.transcribe(&chunk.pcm).await;
            drop(permit);

            if closed.load(Ordering::Acquire) {
                return;
            }
            match result {
                Ok(text) => {
                    reconciler.add_segment(chunk.start, chunk.end, &text);
                    on_update(reconciler.take_combined_text(), !chunk.is_final);
                }
                Err(e) => {
                    warn!(
                        start = ?chunk.start,
                        end = ?chunk.end,
                        retryable = e.is_retryable(),
                        "transcription failed, dropping chunk: {}",
                        e
                    );
                }
            }
        });
    }
}
