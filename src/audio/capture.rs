//! Microphone capture using CPAL.
//!
//! [`CaptureStream`] owns the input device and stream for the lifetime of a
//! session (scoped acquisition: the stream is released before the device
//! handle drops). The data callback runs at real-time priority and does
//! nothing but copy the frame into a bounded queue; when the queue is full
//! the frame is dropped and counted, never blocked on.

use crate::audio::device::AudioOptions;
use crate::error::{Result, VoxflowError};
use cpal::traits::{DeviceTrait, StreamTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// A single capture frame: mono float32 samples in [-1, 1].
pub type Frame = Vec<f32>;

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched while holding the Mutex in
/// `CaptureStream`, so access is serialized across threads.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Push-to-talk gated input stream delivering frames to a bounded queue.
pub struct CaptureStream {
    // Field order matters: the stream must drop before the device.
    stream: Mutex<Option<SendableStream>>,
    device: cpal::Device,
    options: AudioOptions,
    // Taken on close so the frame channel sees every sender released.
    sink: Mutex<Option<mpsc::Sender<Frame>>>,
    dropped: Arc<AtomicU64>,
    running: Mutex<bool>,
}

impl CaptureStream {
    /// Create a capture stream over an already-resolved device.
    ///
    /// Frames land on `sink` via `try_send`; the caller owns the receiving
    /// end (normally the VAD's input queue).
    pub fn new(device: cpal::Device, options: AudioOptions, sink: mpsc::Sender<Frame>) -> Self {
        Self {
            stream: Mutex::new(None),
            device,
            options,
            sink: Mutex::new(Some(sink)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(false),
        }
    }

    /// Number of frames dropped because the sink queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Start (or resume) capturing. Idempotent while running.
    pub fn start(&self) -> Result<()> {
        let mut running = self.lock_running()?;
        if *running {
            return Ok(());
        }

        let mut guard = self.lock_stream()?;
        if guard.is_none() {
            *guard = Some(SendableStream(self.build_stream()?));
        }
        if let Some(stream) = guard.as_ref() {
            stream.0.play().map_err(|e| VoxflowError::DeviceRuntime {
                message: format!("Failed to start audio stream: {}", e),
            })?;
        }
        *running = true;
        debug!("capture stream started");
        Ok(())
    }

    /// Pause capturing. No-op while stopped.
    pub fn stop(&self) -> Result<()> {
        let mut running = self.lock_running()?;
        if !*running {
            return Ok(());
        }

        let guard = self.lock_stream()?;
        if let Some(stream) = guard.as_ref() {
            stream.0.pause().map_err(|e| VoxflowError::DeviceRuntime {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        *running = false;
        debug!("capture stream stopped");
        Ok(())
    }

    /// Release the stream and the frame sender. The device stays resolved
    /// until drop; the consumer's frame channel closes once no other sender
    /// remains. Terminal: a closed stream cannot be restarted.
    pub fn close(&self) -> Result<()> {
        let mut running = self.lock_running()?;
        let mut guard = self.lock_stream()?;
        // The stream's callback holds a sender clone, so both must go.
        *guard = None;
        self.lock_sink()?.take();
        *running = false;
        Ok(())
    }

    /// Returns true while frames are being delivered.
    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| *r).unwrap_or(false)
    }

    fn lock_running(&self) -> Result<std::sync::MutexGuard<'_, bool>> {
        self.running.lock().map_err(|e| VoxflowError::DeviceRuntime {
            message: format!("Failed to lock capture state: {}", e),
        })
    }

    fn lock_stream(&self) -> Result<std::sync::MutexGuard<'_, Option<SendableStream>>> {
        self.stream.lock().map_err(|e| VoxflowError::DeviceRuntime {
            message: format!("Failed to lock capture stream: {}", e),
        })
    }

    fn lock_sink(&self) -> Result<std::sync::MutexGuard<'_, Option<mpsc::Sender<Frame>>>> {
        self.sink.lock().map_err(|e| VoxflowError::DeviceRuntime {
            message: format!("Failed to lock capture sink: {}", e),
        })
    }

    /// Build the mono input stream with the resolved parameters.
    ///
    /// Prefers f32 frames; falls back to i16 with conversion for devices
    /// that only expose integer formats.
    fn build_stream(&self) -> Result<cpal::Stream> {
        let sink = self
            .lock_sink()?
            .as_ref()
            .cloned()
            .ok_or_else(|| VoxflowError::DeviceRuntime {
                message: "Capture stream is closed".to_string(),
            })?;

        let config = cpal::StreamConfig {
            channels: self.options.channels,
            sample_rate: self.options.sample_rate_hz,
            buffer_size: cpal::BufferSize::Fixed(self.options.frames_per_buffer),
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        // f32 path: copy the frame into the bounded queue and return.
        let f32_sink = sink.clone();
        let dropped = Arc::clone(&self.dropped);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if f32_sink.try_send(data.to_vec()).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // i16 fallback: convert on the fly, same bounded hand-off.
        let dropped = Arc::clone(&self.dropped);
        self.device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let frame: Frame = data
                        .iter()
                        .map(|&s| s as f32 / i16::MAX as f32)
                        .collect();
                    if sink.try_send(frame).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| VoxflowError::AudioInit {
                message: format!("Failed to build input stream: {}", e),
            })
    }
}
