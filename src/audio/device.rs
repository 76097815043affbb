//! Input device resolution and session audio parameters.
//!
//! Resolves the system default input device once per session and derives the
//! immutable [`AudioOptions`] every other component works from. The pipeline
//! adapts to whatever sample rate the device reports; there is no resampling.

use crate::defaults;
use crate::error::{Result, VoxflowError};
use cpal::traits::{DeviceTrait, HostTrait};
use std::time::Duration;
use tracing::warn;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses noisy ALSA/JACK/PipeWire messages that cpal triggers while
/// probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2.
/// Safe as long as no other thread is concurrently manipulating fd 2.
pub(crate) fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// List available input devices, filtering out obviously unusable endpoints.
pub fn list_input_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        host.input_devices()
    })
    .map_err(|e| VoxflowError::AudioInit {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name()
            && !should_filter_device(&name)
        {
            names.push(name);
        }
    }
    Ok(names)
}

/// Immutable audio parameters derived once per session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioOptions {
    /// Device sample rate in Hz (at least 8kHz).
    pub sample_rate_hz: u32,
    /// Channel count; the pipeline is mono only.
    pub channels: u16,
    /// Bytes per sample; 16-bit PCM.
    pub bytes_per_sample: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
    /// Wall-clock target for one device callback.
    pub latency: Duration,
    /// Samples delivered per device callback.
    pub frames_per_buffer: u32,
}

impl AudioOptions {
    /// Build options for the given sample rate and callback latency.
    ///
    /// # Errors
    /// Returns `AudioInit` when the sample rate is below 8kHz.
    pub fn new(sample_rate_hz: u32, latency: Duration) -> Result<Self> {
        if sample_rate_hz < defaults::MIN_SAMPLE_RATE {
            return Err(VoxflowError::AudioInit {
                message: format!(
                    "Sample rate {}Hz is below the {}Hz minimum",
                    sample_rate_hz,
                    defaults::MIN_SAMPLE_RATE
                ),
            });
        }

        let frames_per_buffer = (sample_rate_hz as f64 * latency.as_secs_f64()) as u32;
        if frames_per_buffer > defaults::MAX_FRAMES_PER_BUFFER {
            warn!(
                frames_per_buffer,
                "device callback larger than {} frames, capture latency will suffer",
                defaults::MAX_FRAMES_PER_BUFFER
            );
        }

        Ok(Self {
            sample_rate_hz,
            channels: 1,
            bytes_per_sample: 2,
            bits_per_sample: 16,
            latency,
            frames_per_buffer,
        })
    }

    /// Options with the default 50ms callback latency.
    pub fn with_default_latency(sample_rate_hz: u32) -> Result<Self> {
        Self::new(sample_rate_hz, Duration::from_millis(defaults::LATENCY_MS))
    }

    /// PCM throughput in bytes per second.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate_hz * self.channels as u32 * self.bytes_per_sample as u32
    }

    /// Duration of `n_bytes` of PCM at these parameters.
    pub fn duration_of(&self, n_bytes: usize) -> Duration {
        Duration::from_secs_f64(n_bytes as f64 / self.bytes_per_second() as f64)
    }

    /// Number of PCM bytes covering `duration`, rounded down to whole samples.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let raw = (duration.as_secs_f64() * self.bytes_per_second() as f64) as usize;
        raw - raw % self.bytes_per_sample as usize
    }
}

/// Resolve the system default input device and derive [`AudioOptions`] from
/// its reported default configuration.
///
/// # Errors
/// Returns `AudioInit` when no input device exists or it reports no usable
/// default configuration.
pub fn resolve_input_device() -> Result<(cpal::Device, AudioOptions)> {
    let device = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        host.default_input_device()
    })
    .ok_or_else(|| VoxflowError::AudioInit {
        message: "No default input device available".to_string(),
    })?;

    let default_config = device
        .default_input_config()
        .map_err(|e| VoxflowError::AudioInit {
            message: format!("Failed to query default input config: {}", e),
        })?;

    let options = AudioOptions::with_default_latency(default_config.sample_rate())?;
    Ok((device, options))
}
