//! Gapless playback scheduling for decoded agent audio.
//!
//! The streaming speech service delivers agent speech as a sequence of
//! short PCM buffers. The scheduler lines them up back to back on the
//! output clock so playback has no gaps and no overlaps, and keeps track
//! of every scheduled source so hangup can silence everything at once.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::Result;

/// A decoded, playable block of audio.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Creates a buffer from per-channel sample vectors.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    /// Number of channels in this buffer.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples for one channel, if it exists.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Number of sample frames (per-channel samples).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of this buffer in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Identifier for a scheduled playback source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Trait for audio output devices that play buffers at scheduled times.
///
/// This trait allows swapping implementations (real output device vs mock).
/// Times are in seconds on the sink's own monotonic clock.
pub trait PlaybackSink: Send {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Schedules a buffer to start playing at `start_at` seconds.
    ///
    /// # Returns
    /// An identifier that can later be passed to [`PlaybackSink::stop`].
    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId>;

    /// Force-stops a scheduled source. Unknown ids are ignored.
    fn stop(&mut self, id: SourceId);
}

/// One entry in the scheduler's live set.
#[derive(Debug, Clone, Copy)]
struct LiveSource {
    id: SourceId,
    end_time: f64,
}

/// Schedules decoded buffers for gapless sequential playback.
///
/// Maintains a single `next_start_time` cursor on the sink's clock. Buffers
/// are assumed to arrive in the order the remote agent intends them to be
/// heard; no reordering or deduplication is performed.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    next_start_time: f64,
    live: Vec<LiveSource>,
}

impl PlaybackScheduler {
    /// Creates a scheduler driving the given sink.
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            next_start_time: 0.0,
            live: Vec::new(),
        }
    }

    /// Schedules one decoded buffer for playback.
    ///
    /// If buffers arrived late the cursor is pulled forward to the sink's
    /// current time so nothing is ever scheduled in the past; otherwise the
    /// buffer starts exactly where the previous one ends.
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> Result<()> {
        let now = self.sink.current_time();

        // Sources whose scheduled end has passed finished on their own;
        // drop them from the live set without stopping them.
        self.live.retain(|s| s.end_time > now);

        if now > self.next_start_time {
            self.next_start_time = now;
        }

        let duration = buffer.duration_secs();
        let start_at = self.next_start_time;
        let id = self.sink.schedule(buffer, start_at)?;
        self.live.push(LiveSource {
            id,
            end_time: start_at + duration,
        });
        self.next_start_time = start_at + duration;
        Ok(())
    }

    /// Force-stops every not-yet-finished source and clears the live set.
    ///
    /// The cursor is rewound to the sink's current time so that audio
    /// scheduled after the stop starts immediately instead of where the
    /// silenced queue would have ended. Idempotent.
    pub fn stop_all(&mut self) {
        for source in self.live.drain(..) {
            self.sink.stop(source.id);
        }
        self.next_start_time = self.sink.current_time();
    }

    /// Current playback cursor, in seconds on the sink's clock.
    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Number of sources currently tracked as live.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

/// Record of a schedule call, for test inspection.
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub id: SourceId,
    pub start_at: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Default)]
struct MockSinkState {
    time: f64,
    next_id: u64,
    scheduled: Vec<ScheduledCall>,
    stopped: Vec<SourceId>,
    fail_schedule: bool,
}

/// Mock playback sink with a manually advanced clock.
#[derive(Debug, Clone, Default)]
pub struct MockPlaybackSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockPlaybackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the mock to fail on schedule.
    pub fn with_schedule_failure(self) -> Self {
        self.state
            .lock()
            .expect("mock sink mutex poisoned")
            .fail_schedule = true;
        self
    }

    /// Moves the mock clock to an absolute time.
    pub fn set_time(&self, time: f64) {
        self.state.lock().expect("mock sink mutex poisoned").time = time;
    }

    /// All schedule calls seen so far.
    pub fn scheduled(&self) -> Vec<ScheduledCall> {
        self.state
            .lock()
            .expect("mock sink mutex poisoned")
            .scheduled
            .clone()
    }

    /// All stop calls seen so far.
    pub fn stopped(&self) -> Vec<SourceId> {
        self.state
            .lock()
            .expect("mock sink mutex poisoned")
            .stopped
            .clone()
    }
}

impl PlaybackSink for MockPlaybackSink {
    fn current_time(&self) -> f64 {
        self.state.lock().expect("mock sink mutex poisoned").time
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId> {
        let mut state = self.state.lock().expect("mock sink mutex poisoned");
        if state.fail_schedule {
            return Err(crate::error::OutcallError::AudioPlayback {
                message: "mock schedule failure".to_string(),
            });
        }
        let id = SourceId(state.next_id);
        state.next_id += 1;
        state.scheduled.push(ScheduledCall {
            id,
            start_at,
            duration_secs: buffer.duration_secs(),
        });
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        self.state
            .lock()
            .expect("mock sink mutex poisoned")
            .stopped
            .push(id);
    }
}

/// Playback sink that discards audio but keeps wall-clock time.
///
/// Used for headless runs where the transcript matters and the speaker
/// does not.
pub struct DiscardPlaybackSink {
    started: Instant,
    next_id: u64,
}

impl DiscardPlaybackSink {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            next_id: 0,
        }
    }
}

impl Default for DiscardPlaybackSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackSink for DiscardPlaybackSink {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn schedule(&mut self, _buffer: AudioBuffer, _start_at: f64) -> Result<SourceId> {
        let id = SourceId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    fn stop(&mut self, _id: SourceId) {}
}
