//! Default tuning constants for voxflow.
//!
//! Shared across configuration types so the pipeline components agree on
//! one set of defaults.

/// Minimum sample rate accepted from an input device, in Hz.
///
/// Speech recognition quality degrades sharply below 8kHz (telephone band);
/// devices reporting less are treated as misconfigured.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Target wall-clock duration of one device callback, in milliseconds.
///
/// 50ms keeps capture latency low while staying well above the scheduling
/// jitter of desktop audio backends.
pub const LATENCY_MS: u64 = 50;

/// Frames-per-buffer ceiling above which a warning is logged.
///
/// A device callback larger than this adds more latency than the pipeline
/// is tuned for; capture still works, it is just sluggish.
pub const MAX_FRAMES_PER_BUFFER: u32 = 4_096;

/// RMS energy threshold above which a frame counts as speech.
///
/// Unitless RMS over float32 samples in [-1, 1]. Tuned for typical desktop
/// microphone levels.
pub const ENERGY_THRESHOLD: f32 = 0.005;

/// Interval between periodic buffer hand-offs while speaking, in milliseconds.
pub const FLUSH_INTERVAL_MS: u64 = 310;

/// Silence gap that ends an utterance, in milliseconds.
pub const SILENCE_DURATION_MS: u64 = 500;

/// Short silence gap treated as a pause within ongoing speech, in milliseconds.
///
/// A pause flushes the primary buffer for a fast partial result while the
/// secondary buffer keeps accumulating context.
pub const PAUSE_DURATION_MS: u64 = 300;

/// Capacity of the VAD's frame input queue.
///
/// The audio callback drops frames (with a counter) when this fills; at the
/// default 50ms latency this is over six seconds of headroom.
pub const VAD_QUEUE_CAPACITY: usize = 128;

/// Primary buffer: minimum window before a chunk is cut, in milliseconds.
pub const PRIMARY_MIN_WINDOW_MS: u64 = 500;

/// Primary buffer: trailing overlap carried into the next window, in milliseconds.
pub const PRIMARY_OVERLAP_MS: u64 = 100;

/// Secondary buffer: minimum window before a chunk is cut, in milliseconds.
pub const SECONDARY_MIN_WINDOW_MS: u64 = 2_000;

/// Secondary buffer: trailing overlap carried into the next window, in milliseconds.
pub const SECONDARY_OVERLAP_MS: u64 = 400;

/// Capacity of each buffer manager's chunk channel.
///
/// When the remote STT service falls behind, chunks are dropped here rather
/// than queued without bound.
pub const CHUNK_CHANNEL_CAPACITY: usize = 100;

/// Wall-clock bound on a single remote transcription call, in seconds.
pub const STT_TIMEOUT_SECS: u64 = 30;

/// Model identifier sent to the remote STT service.
pub const STT_MODEL: &str = "whisper-1";

/// Default base URL of the remote STT service.
pub const STT_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the STT API credential.
pub const CREDENTIAL_ENV: &str = "OPENAI_API_KEY";

/// Maximum concurrent transcription requests per server.
///
/// Bounds in-flight requests to the remote service under sustained speech.
pub const MAX_CONCURRENT_TRANSCRIPTIONS: usize = 2;

/// Gap below which adjacent transcript segments are merged, in milliseconds.
pub const MERGE_GAP_MS: u64 = 100;

/// Default push-to-talk key code (raw platform key code).
pub const PTT_KEY_CODE: u16 = 56;
