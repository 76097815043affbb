//! Voice activity detection.
//!
//! Classifies capture frames by short-term RMS energy and drives the speech
//! state machine that feeds the transcription buffers:
//!
//! - `SpeechStart` when energy first crosses the threshold,
//! - `Flush(pcm)` every flush interval while speaking (and on speech end),
//! - `Pause` after a short silence gap within ongoing speech,
//! - `SpeechEnd` after the silence gap that ends the utterance.
//!
//! The state machine ([`VadEngine`]) is pure and clock-driven so it can be
//! tested deterministically. Exactly one worker task owns it at runtime; all
//! inputs (frames, timer ticks, shutdown) arrive through channels selected
//! by that worker, so no lock guards VAD state.

use crate::audio::capture::Frame;
use crate::audio::codec;
use crate::defaults;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// Trait for time operations, allowing mock time in tests.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real system clock using `std::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Configuration for voice activity detection.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold above which a frame counts as speech.
    pub energy_threshold: f32,
    /// Interval between periodic buffer hand-offs while speaking.
    pub flush_interval: Duration,
    /// Silence gap that ends the utterance.
    pub silence_duration: Duration,
    /// Silence gap treated as a pause within ongoing speech.
    pub pause_duration: Duration,
    /// Capacity of the frame input queue.
    pub queue_capacity: usize,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: defaults::ENERGY_THRESHOLD,
            flush_interval: Duration::from_millis(defaults::FLUSH_INTERVAL_MS),
            silence_duration: Duration::from_millis(defaults::SILENCE_DURATION_MS),
            pause_duration: Duration::from_millis(defaults::PAUSE_DURATION_MS),
            queue_capacity: defaults::VAD_QUEUE_CAPACITY,
        }
    }
}

/// Current state of voice activity detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech detected.
    Idle,
    /// Speech is being detected.
    Speaking,
}

/// Events emitted by the detector.
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent {
    /// Energy crossed the threshold while idle.
    SpeechStart,
    /// Short silence gap within ongoing speech.
    Pause,
    /// Accumulated audio handed off as PCM16LE.
    Flush(Vec<u8>),
    /// Silence gap ended the utterance.
    SpeechEnd,
}

/// Pure VAD state machine driven off a [`Clock`].
///
/// Both gap timers measure the time since the last energetic frame; a speech
/// frame re-arms them. `Pause` fires once per gap; the silence timer flushes
/// whatever is buffered and ends the utterance.
pub struct VadEngine<C: Clock = SystemClock> {
    config: VadConfig,
    state: VadState,
    buffer: Vec<u8>,
    last_voice: Option<Instant>,
    next_flush: Option<Instant>,
    pause_emitted: bool,
    clock: C,
}

impl<C: Clock> VadEngine<C> {
    /// Creates an engine with the given configuration and clock.
    pub fn with_clock(config: VadConfig, clock: C) -> Self {
        Self {
            config,
            state: VadState::Idle,
            buffer: Vec::new(),
            last_voice: None,
            next_flush: None,
            pause_emitted: false,
            clock,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// Processes one capture frame, returning any events it produced.
    ///
    /// Expired timers are evaluated before the frame so event order is
    /// independent of frame arrival jitter.
    pub fn handle_frame(&mut self, frame: &[f32]) -> Vec<VadEvent> {
        let now = self.clock.now();
        let mut events = self.expire_timers(now);

        let energy = codec::calculate_rms(frame);
        if energy > self.config.energy_threshold {
            if self.state == VadState::Idle {
                self.state = VadState::Speaking;
                self.buffer.clear();
                self.next_flush = Some(now + self.config.flush_interval);
                events.push(VadEvent::SpeechStart);
            }
            self.last_voice = Some(now);
            self.pause_emitted = false;
            self.buffer.extend(codec::pcm16le_from_f32(frame));
        } else if self.state == VadState::Speaking {
            // Silence inside an utterance is still part of the window.
            self.buffer.extend(codec::pcm16le_from_f32(frame));
        }

        events
    }

    /// Evaluates timer deadlines without consuming a frame.
    pub fn tick(&mut self) -> Vec<VadEvent> {
        let now = self.clock.now();
        self.expire_timers(now)
    }

    /// Ends any active utterance, flushing the remaining buffer.
    pub fn finish(&mut self) -> Vec<VadEvent> {
        if self.state != VadState::Speaking {
            return Vec::new();
        }
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            events.push(VadEvent::Flush(std::mem::take(&mut self.buffer)));
        }
        events.push(VadEvent::SpeechEnd);
        self.reset();
        events
    }

    /// Resets to idle, discarding buffered audio.
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.buffer.clear();
        self.last_voice = None;
        self.next_flush = None;
        self.pause_emitted = false;
    }

    fn expire_timers(&mut self, now: Instant) -> Vec<VadEvent> {
        let mut events = Vec::new();
        if self.state != VadState::Speaking {
            return events;
        }

        if let Some(at) = self.next_flush
            && now >= at
        {
            if !self.buffer.is_empty() {
                events.push(VadEvent::Flush(std::mem::take(&mut self.buffer)));
            }
            self.next_flush = Some(now + self.config.flush_interval);
        }

        if let Some(last) = self.last_voice {
            let gap = now.duration_since(last);
            if gap >= self.config.silence_duration {
                if !self.buffer.is_empty() {
                    events.push(VadEvent::Flush(std::mem::take(&mut self.buffer)));
                }
                events.push(VadEvent::SpeechEnd);
                self.reset();
            } else if gap >= self.config.pause_duration && !self.pause_emitted {
                self.pause_emitted = true;
                events.push(VadEvent::Pause);
            }
        }

        events
    }
}

impl VadEngine<SystemClock> {
    /// Creates an engine using the system clock.
    pub fn new(config: VadConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

/// Handle for feeding frames into a running detector.
#[derive(Clone)]
pub struct VadHandle {
    tx: mpsc::Sender<Frame>,
    dropped: Arc<AtomicU64>,
}

impl VadHandle {
    /// Queue a frame without blocking. Drops (and counts) when full.
    pub fn feed(&self, frame: Frame) {
        if self.tx.try_send(frame).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(total, "VAD input queue full, dropping frame");
        }
    }

    /// The raw frame sender, suitable as a capture sink.
    pub fn frame_sender(&self) -> mpsc::Sender<Frame> {
        self.tx.clone()
    }

    /// Number of frames dropped because the queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Voice activity detector: spawns the worker that owns a [`VadEngine`].
pub struct VoiceActivityDetector {
    config: VadConfig,
}

impl VoiceActivityDetector {
    /// Creates a detector with the given configuration.
    pub fn new(config: VadConfig) -> Self {
        Self { config }
    }

    /// Spawns the worker task.
    ///
    /// Returns the feed handle and the serial event stream. The worker exits
    /// when every frame sender is dropped, finishing any active utterance.
    pub fn spawn(self) -> (VadHandle, mpsc::Receiver<VadEvent>) {
        let (frame_tx, frame_rx) = mpsc::channel(self.config.queue_capacity);
        let (event_tx, event_rx) = mpsc::channel(64);
        let dropped = Arc::new(AtomicU64::new(0));

        let engine = VadEngine::new(self.config);
        tokio::spawn(run_worker(engine, frame_rx, event_tx));

        (
            VadHandle {
                tx: frame_tx,
                dropped,
            },
            event_rx,
        )
    }
}

/// Single-owner worker loop: frames and timer ticks multiplexed by select.
async fn run_worker(
    mut engine: VadEngine<SystemClock>,
    mut frames: mpsc::Receiver<Frame>,
    events: mpsc::Sender<VadEvent>,
) {
    // Poll faster than the shortest gap timer so deadlines fire on time
    // even when the capture stream is paused and no frames arrive.
    let mut poll = tokio::time::interval(Duration::from_millis(20));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let emitted = tokio::select! {
            maybe_frame = frames.recv() => match maybe_frame {
                Some(frame) => engine.handle_frame(&frame),
                None => {
                    for event in engine.finish() {
                        let _ = events.send(event).await;
                    }
                    return;
                }
            },
            _ = poll.tick() => engine.tick(),
        };

        for event in emitted {
            if events.send(event).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mock clock for testing that allows manual time advancement.
    #[derive(Debug, Clone)]
    struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, duration: Duration) {
            let mut current = self.current.lock().unwrap();
            *current += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap()
        }
    }

    fn test_config() -> VadConfig {
        VadConfig {
            energy_threshold: 0.005,
            flush_interval: Duration::from_millis(310),
            silence_duration: Duration::from_millis(500),
            pause_duration: Duration::from_millis(300),
            queue_capacity: 128,
        }
    }

    /// 50ms of speech at 16kHz.
    fn speech_frame() -> Frame {
        vec![0.1f32; 800]
    }

    /// 50ms of silence at 16kHz.
    fn silence_frame() -> Frame {
        vec![0.0f32; 800]
    }

    /// Feed `count` frames, advancing the clock 50ms per frame.
    fn feed(
        engine: &mut VadEngine<MockClock>,
        clock: &MockClock,
        frame: &Frame,
        count: usize,
        events: &mut Vec<VadEvent>,
    ) {
        for _ in 0..count {
            events.extend(engine.handle_frame(frame));
            clock.advance(Duration::from_millis(50));
        }
    }

    fn count_matching(events: &[VadEvent], pred: impl Fn(&VadEvent) -> bool) -> usize {
        events.iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn engine_starts_idle() {
        let engine = VadEngine::new(test_config());
        assert_eq!(engine.state(), VadState::Idle);
    }

    #[test]
    fn empty_frame_scores_zero_and_stays_idle() {
        let mut engine = VadEngine::new(test_config());
        let events = engine.handle_frame(&[]);
        assert!(events.is_empty());
        assert_eq!(engine.state(), VadState::Idle);
    }

    #[test]
    fn speech_boundary_sequence() {
        // 100ms silence, 600ms speech, 700ms silence:
        // one SpeechStart, at least one non-empty Flush, one SpeechEnd, Idle.
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &silence_frame(), 2, &mut events);
        feed(&mut engine, &clock, &speech_frame(), 12, &mut events);
        feed(&mut engine, &clock, &silence_frame(), 14, &mut events);
        events.extend(engine.tick());

        assert_eq!(
            count_matching(&events, |e| matches!(e, VadEvent::SpeechStart)),
            1
        );
        assert!(
            count_matching(&events, |e| matches!(e, VadEvent::Flush(pcm) if !pcm.is_empty())) >= 1
        );
        assert_eq!(
            count_matching(&events, |e| matches!(e, VadEvent::SpeechEnd)),
            1
        );
        assert_eq!(engine.state(), VadState::Idle);
    }

    #[test]
    fn pause_fires_once_without_ending_speech() {
        // Speech, 350ms silence, speech again: exactly one Pause, no SpeechEnd.
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &speech_frame(), 8, &mut events);
        feed(&mut engine, &clock, &silence_frame(), 7, &mut events);
        feed(&mut engine, &clock, &speech_frame(), 8, &mut events);

        assert_eq!(count_matching(&events, |e| matches!(e, VadEvent::Pause)), 1);
        assert_eq!(
            count_matching(&events, |e| matches!(e, VadEvent::SpeechEnd)),
            0
        );
        assert_eq!(engine.state(), VadState::Speaking);
    }

    #[test]
    fn periodic_flush_while_speaking() {
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        // 1 second of continuous speech crosses the 310ms interval 3 times.
        feed(&mut engine, &clock, &speech_frame(), 20, &mut events);

        let flushes = count_matching(&events, |e| matches!(e, VadEvent::Flush(_)));
        assert!(flushes >= 2, "expected periodic flushes, got {}", flushes);
        // Buffer is cleared on each flush, so flushed chunks partition the audio.
        let total: usize = events
            .iter()
            .filter_map(|e| match e {
                VadEvent::Flush(pcm) => Some(pcm.len()),
                _ => None,
            })
            .sum();
        assert!(total > 0);
    }

    #[test]
    fn silence_frames_are_buffered_during_speech() {
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &speech_frame(), 2, &mut events);
        feed(&mut engine, &clock, &silence_frame(), 2, &mut events);
        let final_events = engine.finish();

        let flushed: usize = events
            .iter()
            .chain(&final_events)
            .filter_map(|e| match e {
                VadEvent::Flush(pcm) => Some(pcm.len()),
                _ => None,
            })
            .sum();
        // 4 frames of 800 samples = 6400 bytes of PCM16.
        assert_eq!(flushed, 6400);
    }

    #[test]
    fn idle_frames_are_not_buffered() {
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &silence_frame(), 10, &mut events);
        assert!(events.is_empty());
        assert!(engine.finish().is_empty());
    }

    #[test]
    fn finish_flushes_remaining_buffer() {
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &speech_frame(), 3, &mut events);
        let final_events = engine.finish();

        assert!(matches!(final_events[0], VadEvent::Flush(ref pcm) if !pcm.is_empty()));
        assert_eq!(final_events[1], VadEvent::SpeechEnd);
        assert_eq!(engine.state(), VadState::Idle);
    }

    #[test]
    fn reset_discards_buffer_and_state() {
        let clock = MockClock::new();
        let mut engine = VadEngine::with_clock(test_config(), clock.clone());
        let mut events = Vec::new();

        feed(&mut engine, &clock, &speech_frame(), 3, &mut events);
        engine.reset();
        assert_eq!(engine.state(), VadState::Idle);
        assert!(engine.finish().is_empty());
    }

    #[tokio::test]
    async fn worker_emits_events_for_fed_frames() {
        let detector = VoiceActivityDetector::new(test_config());
        let (handle, mut events) = detector.spawn();

        for _ in 0..4 {
            handle.feed(speech_frame());
        }

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out")
            .expect("worker closed");
        assert_eq!(event, VadEvent::SpeechStart);
    }

    #[tokio::test]
    async fn worker_finishes_utterance_when_senders_drop() {
        let detector = VoiceActivityDetector::new(test_config());
        let (handle, mut events) = detector.spawn();

        handle.feed(speech_frame());
        handle.feed(speech_frame());
        drop(handle);

        let mut seen = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_secs(1), events.recv()).await
        {
            seen.push(event);
        }
        assert!(seen.contains(&VadEvent::SpeechStart));
        assert_eq!(seen.last(), Some(&VadEvent::SpeechEnd));
    }

    #[tokio::test]
    async fn worker_runs_until_the_last_frame_sender_drops() {
        let detector = VoiceActivityDetector::new(test_config());
        let (handle, mut events) = detector.spawn();

        // A capture stream holds its own sender clone; the worker must not
        // exit while that clone is alive.
        let capture_sink = handle.frame_sender();
        drop(handle);

        let _ = capture_sink.send(speech_frame()).await;
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("worker should still be serving the remaining sender")
            .expect("worker closed early");
        assert_eq!(event, VadEvent::SpeechStart);

        // Only once every sender is gone does the event stream end.
        drop(capture_sink);
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while events.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "worker did not exit after senders dropped");
    }

    #[tokio::test]
    async fn feed_drops_when_queue_full_without_blocking() {
        let config = VadConfig {
            queue_capacity: 2,
            ..test_config()
        };
        // Build the handle without a worker so nothing drains the queue.
        let (tx, _rx) = mpsc::channel(config.queue_capacity);
        let handle = VadHandle {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        for _ in 0..5 {
            handle.feed(silence_frame());
        }
        assert_eq!(handle.dropped_frames(), 3);
    }
}
