//! Audio capture and playback.

pub mod capture;
#[cfg(feature = "cpal-audio")]
pub mod cpal;
pub mod playback;
pub mod source;

pub use capture::{CapturePipeline, EncodedAudioChunk};
pub use playback::{AudioBuffer, DiscardPlaybackSink, PlaybackScheduler, PlaybackSink, SourceId};
pub use source::{CaptureHandle, CaptureSource, MockCaptureSource, WavCaptureSource, spawn_capture_thread};

#[cfg(feature = "cpal-audio")]
pub use cpal::{CpalCaptureSource, CpalPlaybackSink, list_input_devices, suppress_audio_warnings};
