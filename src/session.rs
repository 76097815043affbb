//! Session assembly.
//!
//! [`VoiceSession`] owns the whole capture-to-transcript pipeline for one
//! run: device resolution, VAD, buffers, the remote client, and the server.
//! It also owns shutdown ordering: the capture stream closes before the
//! device handle drops, and the server closes last so in-flight chunks
//! settle.

use crate::audio::capture::CaptureStream;
use crate::audio::device::{AudioOptions, resolve_input_device};
use crate::audio::vad::{VadConfig, VadEvent, VadHandle, VoiceActivityDetector};
use crate::config::Config;
use crate::defaults;
use crate::error::Result;
use crate::input::hotkey::{HotkeyEvent, PushToTalkMonitor};
use crate::transcription::buffer::BufferManager;
use crate::transcription::client::WhisperApiClient;
use crate::transcription::reconciler::TextReconciler;
use crate::transcription::server::{TranscriptionServer, UpdateCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How capture is gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Capture only while the configured key is held; one take per press.
    PushToTalk,
    /// Capture continuously, VAD-gated, with the dual windowed buffers.
    Continuous,
}

/// A fully wired voice pipeline.
pub struct VoiceSession {
    capture: CaptureStream,
    server: Arc<TranscriptionServer>,
    vad: Option<VadHandle>,
    forwarder: Option<JoinHandle<()>>,
    key_code: u16,
}

impl VoiceSession {
    /// Resolve the device and assemble the pipeline.
    ///
    /// # Errors
    /// Fails fast on invalid configuration, a missing credential, or an
    /// unusable input device.
    pub fn build(config: &Config, mode: SessionMode, on_update: UpdateCallback) -> Result<Self> {
        let language = config.validate()?;
        let api_key = config.api_key()?;

        let (device, probed) = resolve_input_device()?;
        let options = AudioOptions::new(probed.sample_rate_hz, config.latency())?;
        info!(
            sample_rate = options.sample_rate_hz,
            frames_per_buffer = options.frames_per_buffer,
            "input device resolved"
        );

        let mut client = WhisperApiClient::new(api_key, options)
            .with_base_url(config.stt.base_url.clone())
            .with_model(config.stt.model.clone())
            .with_timeout(config.stt_timeout());
        if let Some(language) = language {
            client = client.with_language(language);
        }

        let (primary, secondary) = match mode {
            SessionMode::Continuous => (
                Arc::new(BufferManager::primary(options)),
                Some(Arc::new(BufferManager::secondary(options))),
            ),
            SessionMode::PushToTalk => (
                Arc::new(BufferManager::simple(
                    options,
                    Duration::from_millis(defaults::PRIMARY_MIN_WINDOW_MS),
                )),
                None,
            ),
        };

        let reconciler = Arc::new(TextReconciler::new(config.merge_gap()));
        let server = Arc::new(TranscriptionServer::new(
            primary,
            secondary,
            Arc::new(client),
            reconciler,
            on_update,
        ));
        server.start()?;

        let (vad, events) = VoiceActivityDetector::new(VadConfig::default()).spawn();
        let forwarder = tokio::spawn(forward_events(events, Arc::clone(&server)));

        let capture = CaptureStream::new(device, options, vad.frame_sender());

        Ok(Self {
            capture,
            server,
            vad: Some(vad),
            forwarder: Some(forwarder),
            key_code: config.voice.key_code,
        })
    }

    /// Run continuously until the caller's shutdown future resolves.
    pub async fn run_continuous(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.capture.start()?;
        shutdown.await;
        self.capture.stop()?;
        Ok(())
    }

    /// Run the push-to-talk loop until the caller's shutdown future resolves.
    pub async fn run_push_to_talk(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut keys = PushToTalkMonitor::new(self.key_code).spawn();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                maybe_event = keys.recv() => match maybe_event {
                    Some(HotkeyEvent::AudioStart) => self.capture.start()?,
                    Some(HotkeyEvent::AudioEnd) => {
                        // Only stop the stream here. The VAD still holds the
                        // tail of the take; its silence timer delivers the
                        // last flush and the final buffer flush, so flushing
                        // now would split one take into two short pieces.
                        self.capture.stop()?;
                    }
                    None => break,
                },
                _ = &mut shutdown => break,
            }
        }

        self.capture.stop()?;
        Ok(())
    }

    /// Tear the pipeline down in dependency order.
    pub async fn close(mut self) -> Result<()> {
        // Releases the stream and every capture-side frame sender.
        self.capture.close()?;
        // With the capture senders gone, dropping the VAD handle leaves the
        // frame channel without senders: the VAD worker exits, its event
        // channel closes, and the forwarder below can finish.
        self.vad.take();
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
        self.server.close().await;
        debug!("voice session closed");
        Ok(())
    }
}

/// Map VAD events onto server operations.
async fn forward_events(
    mut events: tokio::sync::mpsc::Receiver<VadEvent>,
    server: Arc<TranscriptionServer>,
) {
    while let Some(event) = events.recv().await {
        apply_event(&server, event);
    }
}

fn apply_event(server: &TranscriptionServer, event: VadEvent) {
    match event {
        VadEvent::SpeechStart => debug!("speech started"),
        VadEvent::Flush(pcm) => server.add_audio(&pcm),
        VadEvent::Pause => server.flush_primary(),
        VadEvent::SpeechEnd => server.flush_buffers(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::client::{SpeechToText, TranscribeError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoBackend;

    #[async_trait]
    impl SpeechToText for EchoBackend {
        async fn transcribe(&self, _pcm: &[u8]) -> std::result::Result<String, TranscribeError> {
            Ok("hello".to_string())
        }
    }

    fn test_server() -> (Arc<TranscriptionServer>, Arc<Mutex<Vec<(String, bool)>>>) {
        let options = AudioOptions::with_default_latency(16000).unwrap();
        let updates: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let callback: UpdateCallback = Arc::new(move |text, processing| {
            sink.lock().unwrap().push((text, processing));
        });
        let server = Arc::new(TranscriptionServer::new(
            Arc::new(BufferManager::primary(options)),
            None,
            Arc::new(EchoBackend),
            Arc::new(TextReconciler::default()),
            callback,
        ));
        server.start().unwrap();
        (server, updates)
    }

    #[tokio::test]
    async fn flush_events_become_audio() {
        let (server, updates) = test_server();

        // 600ms of PCM through a Flush triggers a primary cut.
        apply_event(&server, VadEvent::Flush(vec![0u8; 32 * 600]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await;

        assert_eq!(updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn speech_end_flushes_the_residual() {
        let (server, updates) = test_server();

        apply_event(&server, VadEvent::SpeechStart);
        apply_event(&server, VadEvent::Flush(vec![0u8; 32 * 200]));
        apply_event(&server, VadEvent::SpeechEnd);
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await;

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(!updates[0].1, "speech end marks the chunk final");
    }

    #[tokio::test]
    async fn shutdown_order_lets_the_forwarder_finish() {
        let (server, _updates) = test_server();
        let (vad, events) = VoiceActivityDetector::new(VadConfig::default()).spawn();
        // Stand-in for the capture stream's sender clone.
        let capture_sink = vad.frame_sender();
        let forwarder = tokio::spawn(forward_events(events, Arc::clone(&server)));

        // Teardown order mirrors close(): capture senders first, then the
        // VAD handle, then the forwarder, then the server.
        drop(capture_sink);
        drop(vad);
        let finished = tokio::time::timeout(Duration::from_secs(2), forwarder).await;
        assert!(finished.is_ok(), "event forwarder did not finish");
        server.close().await;
    }

    #[tokio::test]
    async fn short_take_survives_a_split_across_key_release() {
        // One 550ms take arriving as two sub-window flushes (the tail lands
        // after key release) must still come out as a single chunk.
        let options = AudioOptions::with_default_latency(16000).unwrap();
        let updates: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let callback: UpdateCallback = Arc::new(move |text, processing| {
            sink.lock().unwrap().push((text, processing));
        });
        let server = Arc::new(TranscriptionServer::new(
            Arc::new(BufferManager::simple(
                options,
                Duration::from_millis(defaults::PRIMARY_MIN_WINDOW_MS),
            )),
            None,
            Arc::new(EchoBackend),
            Arc::new(TextReconciler::default()),
            callback,
        ));
        server.start().unwrap();

        apply_event(&server, VadEvent::Flush(vec![0u8; 32 * 300]));
        apply_event(&server, VadEvent::Flush(vec![0u8; 32 * 250]));
        apply_event(&server, VadEvent::SpeechEnd);
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await;

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1, "expected the whole take in one chunk");
        assert!(!updates[0].1);
    }

    #[tokio::test]
    async fn pause_flushes_only_the_primary() {
        let (server, updates) = test_server();

        apply_event(&server, VadEvent::Flush(vec![0u8; 32 * 200]));
        apply_event(&server, VadEvent::Pause);
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await;

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].1, "pause produces an interim result");
    }
}
