//! Microphone capture sources.
//!
//! A capture source produces normalized float samples ([-1, 1]) at 16kHz
//! mono. The trait allows swapping implementations: a live device, a WAV
//! file for simulated calls, or a mock for tests.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::defaults::INPUT_SAMPLE_RATE;
use crate::error::{OutcallError, Result};

/// Trait for microphone-like audio sources.
pub trait CaptureSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read whatever samples accumulated since the last read.
    ///
    /// # Returns
    /// Float samples in [-1, 1] at 16kHz mono; empty when nothing is
    /// available yet.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    /// Whether the source runs out of samples (WAV file vs live device).
    fn is_finite(&self) -> bool {
        false
    }
}

#[derive(Debug, Default)]
struct MockCaptureState {
    started: bool,
    reads: u64,
}

/// Mock capture source for testing.
///
/// Clones share state so tests can observe start/stop after the source
/// has been handed to the capture thread.
#[derive(Debug, Clone)]
pub struct MockCaptureSource {
    state: Arc<Mutex<MockCaptureState>>,
    samples: Vec<f32>,
    repeats: u64,
    should_fail_start: bool,
    permission_denied: bool,
    error_message: String,
}

impl MockCaptureSource {
    /// Create a mock that yields 4096 zero samples per read, forever.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockCaptureState::default())),
            samples: vec![0.0; 4096],
            repeats: u64::MAX,
            should_fail_start: false,
            permission_denied: false,
            error_message: "mock capture error".to_string(),
        }
    }

    /// Configure the mock to return specific samples on each read.
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.samples = samples;
        self
    }

    /// Limit the mock to a fixed number of non-empty reads.
    pub fn with_repeats(mut self, repeats: u64) -> Self {
        self.repeats = repeats;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on start with a permission error.
    pub fn with_permission_denied(mut self) -> Self {
        self.should_fail_start = true;
        self.permission_denied = true;
        self
    }

    /// Check if the source is currently started.
    pub fn is_started(&self) -> bool {
        self.state.lock().expect("mock capture mutex poisoned").started
    }
}

impl Default for MockCaptureSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSource for MockCaptureSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            return Err(if self.permission_denied {
                OutcallError::PermissionDenied {
                    message: self.error_message.clone(),
                }
            } else {
                OutcallError::AudioCapture {
                    message: self.error_message.clone(),
                }
            });
        }
        self.state.lock().expect("mock capture mutex poisoned").started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().expect("mock capture mutex poisoned").started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut state = self.state.lock().expect("mock capture mutex poisoned");
        if state.reads >= self.repeats {
            return Ok(Vec::new());
        }
        state.reads += 1;
        Ok(self.samples.clone())
    }

    fn is_finite(&self) -> bool {
        self.repeats != u64::MAX
    }
}

/// Capture source that reads from WAV file data.
///
/// Supports arbitrary sample rates and channels, downmixing and resampling
/// to 16kHz mono. Used for simulated calls where a recording stands in for
/// the microphone.
pub struct WavCaptureSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
}

impl WavCaptureSource {
    /// Create from any reader.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| OutcallError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels;

        let raw_samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => wav_reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| OutcallError::AudioCapture {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        // Downmix to mono by averaging channels
        let mono_samples: Vec<f32> = if source_channels > 1 {
            raw_samples
                .chunks_exact(source_channels as usize)
                .map(|frame| frame.iter().sum::<f32>() / source_channels as f32)
                .collect()
        } else {
            raw_samples
        };

        let samples = if source_rate != INPUT_SAMPLE_RATE {
            resample(&mono_samples, source_rate, INPUT_SAMPLE_RATE)
        } else {
            mono_samples
        };

        // 100ms chunks at 16kHz
        let chunk_size = 1600;

        Ok(Self {
            samples,
            position: 0,
            chunk_size,
        })
    }

    /// Create from a file on disk.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(Box::new(std::io::BufReader::new(file)))
    }

    /// Total samples remaining.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl CaptureSource for WavCaptureSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        if self.position >= self.samples.len() {
            return Ok(Vec::new());
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }

    fn is_finite(&self) -> bool {
        true
    }
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}

/// Handle to a capture thread spawned by [`spawn_capture_thread`].
#[derive(Clone)]
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Stops the capture thread; the thread stops the source on exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true if the capture thread is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Starts the source and spawns a thread that forwards sample batches
/// into a channel.
///
/// The thread runs until the handle is stopped, the receiver is dropped,
/// or a finite source runs dry. The source is stopped from the thread on
/// exit, whichever way it ends.
pub fn spawn_capture_thread(
    mut source: Box<dyn CaptureSource>,
    tx: tokio::sync::mpsc::Sender<Vec<f32>>,
    poll_interval_ms: u64,
) -> Result<CaptureHandle> {
    source.start()?;

    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();
    let finite = source.is_finite();
    let poll_interval = std::time::Duration::from_millis(poll_interval_ms);

    std::thread::spawn(move || {
        while thread_running.load(Ordering::SeqCst) {
            match source.read_samples() {
                Ok(samples) if !samples.is_empty() => {
                    if tx.blocking_send(samples).is_err() {
                        break;
                    }
                }
                Ok(_) => {
                    if finite {
                        break;
                    }
                    std::thread::sleep(poll_interval);
                }
                Err(e) => {
                    eprintln!("outcall: audio capture error: {}", e);
                    break;
                }
            }
        }
        thread_running.store(false, Ordering::SeqCst);
        if let Err(e) = source.stop() {
            eprintln!("outcall: failed to stop capture source: {}", e);
        }
    });

    Ok(CaptureHandle { running })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn mock_source_returns_configured_samples() {
        let mut source = MockCaptureSource::new().with_samples(vec![0.1, 0.2, 0.3]);
        assert_eq!(source.read_samples().unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn mock_source_honors_repeat_limit() {
        let mut source = MockCaptureSource::new()
            .with_samples(vec![0.5; 16])
            .with_repeats(2);
        assert_eq!(source.read_samples().unwrap().len(), 16);
        assert_eq!(source.read_samples().unwrap().len(), 16);
        assert!(source.read_samples().unwrap().is_empty());
        assert!(source.is_finite());
    }

    #[test]
    fn mock_source_permission_failure() {
        let mut source = MockCaptureSource::new().with_permission_denied();
        match source.start() {
            Err(OutcallError::PermissionDenied { .. }) => {}
            other => panic!("Expected PermissionDenied, got {:?}", other.err()),
        }
        assert!(!source.is_started());
    }

    #[test]
    fn mock_source_clones_share_started_state() {
        let mut source = MockCaptureSource::new();
        let observer = source.clone();
        source.start().unwrap();
        assert!(observer.is_started());
        source.stop().unwrap();
        assert!(!observer.is_started());
    }

    #[test]
    fn wav_source_16khz_mono_normalizes() {
        let data = make_wav_data(16_000, 1, &[16384, -16384, 0]);
        let mut source = WavCaptureSource::from_reader(Box::new(Cursor::new(data))).unwrap();
        let samples = source.read_samples().unwrap();
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.5).abs() < 1e-4);
        assert!((samples[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn wav_source_stereo_downmixes_to_mono() {
        let data = make_wav_data(16_000, 2, &[16384, 0, -16384, 0]);
        let mut source = WavCaptureSource::from_reader(Box::new(Cursor::new(data))).unwrap();
        let samples = source.read_samples().unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.25).abs() < 1e-4);
        assert!((samples[1] + 0.25).abs() < 1e-4);
    }

    #[test]
    fn wav_source_resamples_48khz() {
        let data = make_wav_data(48_000, 1, &[1000; 4800]); // 100ms at 48kHz
        let source = WavCaptureSource::from_reader(Box::new(Cursor::new(data))).unwrap();
        // 100ms at 16kHz is 1600 samples, allow for ceil rounding
        assert!((source.remaining() as i64 - 1600).abs() <= 1);
    }

    #[test]
    fn wav_source_reads_in_chunks_then_empty() {
        let data = make_wav_data(16_000, 1, &[100; 2000]);
        let mut source = WavCaptureSource::from_reader(Box::new(Cursor::new(data))).unwrap();
        assert_eq!(source.read_samples().unwrap().len(), 1600);
        assert_eq!(source.read_samples().unwrap().len(), 400);
        assert!(source.read_samples().unwrap().is_empty());
        assert!(source.is_finite());
    }

    #[test]
    fn wav_source_rejects_invalid_data() {
        let result = WavCaptureSource::from_reader(Box::new(Cursor::new(vec![1u8, 2, 3])));
        assert!(matches!(result, Err(OutcallError::AudioCapture { .. })));
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn resample_halves_sample_count() {
        let samples = vec![0.5; 100];
        let out = resample(&samples, 32_000, 16_000);
        assert_eq!(out.len(), 50);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[tokio::test]
    async fn capture_thread_forwards_batches_and_stops() {
        let source = MockCaptureSource::new().with_samples(vec![0.25; 160]);
        let observer = source.clone();
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);

        let handle = spawn_capture_thread(Box::new(source), tx, 1).unwrap();
        assert!(handle.is_running());

        let batch = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .expect("timed out waiting for capture batch")
            .expect("capture channel closed");
        assert_eq!(batch.len(), 160);

        handle.stop();
        // Drain until the thread observes the stop flag and exits.
        while rx.recv().await.is_some() {}
        assert!(!observer.is_started());
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn capture_thread_start_failure_propagates() {
        let source = MockCaptureSource::new().with_start_failure();
        let (tx, _rx) = tokio::sync::mpsc::channel(4);
        let result = spawn_capture_thread(Box::new(source), tx, 1);
        assert!(matches!(result, Err(OutcallError::AudioCapture { .. })));
    }

    #[tokio::test]
    async fn capture_thread_ends_when_finite_source_drains() {
        let source = MockCaptureSource::new()
            .with_samples(vec![0.1; 16])
            .with_repeats(3);
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let _handle = spawn_capture_thread(Box::new(source), tx, 1).unwrap();

        let mut batches = 0;
        while let Some(_batch) = rx.recv().await {
            batches += 1;
        }
        assert_eq!(batches, 3);
    }
}
