//! Real audio I/O using CPAL (Cross-Platform Audio Library).
//!
//! Provides a live microphone [`CaptureSource`] and a mixing
//! [`PlaybackSink`] driven by an output stream callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::playback::{AudioBuffer, PlaybackSink, SourceId};
use crate::audio::source::{CaptureSource, resample};
use crate::defaults::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::{OutcallError, Result};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
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

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
/// These are harmless but confusing to users.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice calls).
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

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// # Returns
/// A vector of device names, with preferred devices marked with "\[recommended\]".
/// Filters out obviously unusable devices (surround channels, HDMI, etc.).
///
/// # Errors
/// Returns `OutcallError::AudioCapture` if device enumeration fails.
pub fn list_input_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| OutcallError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// This ensures we respect the desktop's audio device selection.
fn get_best_input_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| OutcallError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

fn find_input_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;

            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }

            Err(OutcallError::AudioDeviceNotFound {
                device: name.to_string(),
            })
        } else {
            get_best_input_device()
        }
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: We ensure that the stream is only accessed from a single thread at
/// a time through the Mutex wrapper in the owning type. The stream methods are
/// called synchronously and don't cross thread boundaries unsafely.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Live microphone capture via CPAL.
///
/// Captures float audio at 16kHz mono. Tries the preferred format first
/// (f32/16kHz/mono), then falls back to the device's default config with
/// software conversion (channel mixing + resampling).
pub struct CpalCaptureSource {
    device: cpal::Device,
    stream: Arc<Mutex<Option<SendableStream>>>,
    buffer: Arc<Mutex<Vec<f32>>>,
    callback_count: Arc<AtomicU64>,
}

impl CpalCaptureSource {
    /// Create a capture source for the named device, or the best default.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_input_device(device_name)?;

        Ok(Self {
            device,
            stream: Arc::new(Mutex::new(None)),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(INPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("Audio stream error: {}", err);
        };

        // Try f32/16kHz/mono — PipeWire/PulseAudio convert transparently
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // Fallback: capture at device's native config, convert in software.
        // Some PipeWire-ALSA setups accept non-native configs but never deliver data.
        self.build_stream_native()
    }

    /// Build a stream using the device's default/native config, with software
    /// channel mixing (stereo→mono) and resampling (native rate→16kHz).
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let default_config =
            self.device
                .default_input_config()
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to query default input config: {}", e),
                })?;

        let native_rate = default_config.sample_rate().0;
        let native_channels = default_config.channels() as usize;
        let stream_config: cpal::StreamConfig = default_config.clone().into();

        eprintln!(
            "outcall: using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            eprintln!("Audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let converted =
                            convert_to_mono_16khz(data, native_channels, native_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to build native f32 stream: {}", e),
                }),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let float_data: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let converted =
                            convert_to_mono_16khz(&float_data, native_channels, native_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to build native i16 stream: {}", e),
                }),
            fmt => Err(OutcallError::AudioCapture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a device in the configuration.",
                    fmt
                ),
            }),
        }
    }
}

/// Mix multi-channel audio to mono and resample to 16kHz.
fn convert_to_mono_16khz(samples: &[f32], channels: usize, source_rate: u32) -> Vec<f32> {
    let mono: Vec<f32> = if channels <= 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if source_rate == INPUT_SAMPLE_RATE {
        mono
    } else {
        resample(&mono, source_rate, INPUT_SAMPLE_RATE)
    }
}

impl CaptureSource for CpalCaptureSource {
    fn start(&mut self) -> Result<()> {
        {
            let stream_guard = self.stream.lock().map_err(|e| OutcallError::AudioCapture {
                message: format!("Failed to lock stream: {}", e),
            })?;
            if stream_guard.is_some() {
                return Ok(()); // Already started
            }
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| OutcallError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })?;

        // Wait briefly to check if the CPAL callback actually fires.
        // Some PipeWire-ALSA setups accept non-native configs but never deliver data.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }

            let native_stream = self.build_stream_native()?;
            native_stream
                .play()
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to start native audio stream: {}", e),
                })?;
            native_stream
        } else {
            stream
        };

        let mut stream_guard = self.stream.lock().map_err(|e| OutcallError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;
        *stream_guard = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut stream_guard = self.stream.lock().map_err(|e| OutcallError::AudioCapture {
            message: format!("Failed to lock stream: {}", e),
        })?;

        if let Some(sendable_stream) = stream_guard.take() {
            sendable_stream
                .0
                .pause()
                .map_err(|e| OutcallError::AudioCapture {
                    message: format!("Failed to stop audio stream: {}", e),
                })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut buffer = self.buffer.lock().map_err(|e| OutcallError::AudioCapture {
            message: format!("Failed to lock audio buffer: {}", e),
        })?;

        let samples = buffer.clone();
        buffer.clear();
        Ok(samples)
    }
}

/// One block of audio queued in the output mixer.
struct MixSource {
    id: SourceId,
    start_sample: u64,
    samples: Vec<f32>,
}

impl MixSource {
    fn end_sample(&self) -> u64 {
        self.start_sample + self.samples.len() as u64
    }
}

#[derive(Default)]
struct MixerState {
    clock_samples: u64,
    next_id: u64,
    sources: Vec<MixSource>,
}

/// Speaker output via CPAL, mixing scheduled buffers in the stream callback.
///
/// The clock is sample-accurate: it counts frames the output callback has
/// consumed, so `current_time` reflects actual playback position rather than
/// wall time.
pub struct CpalPlaybackSink {
    state: Arc<Mutex<MixerState>>,
    _stream: SendableStream,
    stream_rate: u32,
}

impl CpalPlaybackSink {
    /// Create a sink on the default output device and start its stream.
    pub fn new() -> Result<Self> {
        let device = with_suppressed_stderr(|| {
            cpal::default_host().default_output_device().ok_or_else(|| {
                OutcallError::AudioDeviceNotFound {
                    device: "default output".to_string(),
                }
            })
        })?;

        let state = Arc::new(Mutex::new(MixerState::default()));

        // Prefer the synthesis rate; fall back to the device's native rate
        // and let schedule-time resampling bridge the difference.
        let preferred_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(OUTPUT_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("Audio stream error: {}", err);
        };

        let callback_state = Arc::clone(&state);
        let preferred = device.build_output_stream(
            &preferred_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                mix_output(&callback_state, data, 1);
            },
            err_callback,
            None,
        );

        let (stream, stream_rate) = match preferred {
            Ok(stream) => (stream, OUTPUT_SAMPLE_RATE),
            Err(_) => {
                let default_config = device.default_output_config().map_err(|e| {
                    OutcallError::AudioPlayback {
                        message: format!("Failed to query default output config: {}", e),
                    }
                })?;
                let native_rate = default_config.sample_rate().0;
                let native_channels = default_config.channels() as usize;
                let stream_config: cpal::StreamConfig = default_config.into();

                let callback_state = Arc::clone(&state);
                let stream = device
                    .build_output_stream(
                        &stream_config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            mix_output(&callback_state, data, native_channels);
                        },
                        err_callback,
                        None,
                    )
                    .map_err(|e| OutcallError::AudioPlayback {
                        message: format!("Failed to build output stream: {}", e),
                    })?;
                (stream, native_rate)
            }
        };

        stream.play().map_err(|e| OutcallError::AudioPlayback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            state,
            _stream: SendableStream(stream),
            stream_rate,
        })
    }
}

/// Fill one output callback's worth of frames from the mixer state.
fn mix_output(state: &Arc<Mutex<MixerState>>, data: &mut [f32], channels: usize) {
    let Ok(mut state) = state.lock() else {
        data.fill(0.0);
        return;
    };

    for frame in data.chunks_mut(channels.max(1)) {
        let t = state.clock_samples;
        let mut sample = 0.0f32;
        for source in &state.sources {
            if t >= source.start_sample && t < source.end_sample() {
                sample += source.samples[(t - source.start_sample) as usize];
            }
        }
        let sample = sample.clamp(-1.0, 1.0);
        for out in frame.iter_mut() {
            *out = sample;
        }
        state.clock_samples += 1;
    }

    let now = state.clock_samples;
    state.sources.retain(|s| s.end_sample() > now);
}

impl PlaybackSink for CpalPlaybackSink {
    fn current_time(&self) -> f64 {
        let clock = self
            .state
            .lock()
            .map(|s| s.clock_samples)
            .unwrap_or_default();
        clock as f64 / self.stream_rate as f64
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<SourceId> {
        // Downmix to mono and match the stream rate.
        let frame_count = buffer.frame_count();
        let channel_count = buffer.channel_count().max(1);
        let mut mono = vec![0.0f32; frame_count];
        for ch in 0..buffer.channel_count() {
            if let Some(samples) = buffer.channel(ch) {
                for (acc, &s) in mono.iter_mut().zip(samples) {
                    *acc += s / channel_count as f32;
                }
            }
        }
        let samples = if buffer.sample_rate() != self.stream_rate {
            resample(&mono, buffer.sample_rate(), self.stream_rate)
        } else {
            mono
        };

        let mut state = self.state.lock().map_err(|e| OutcallError::AudioPlayback {
            message: format!("Failed to lock mixer state: {}", e),
        })?;
        let id = SourceId(state.next_id);
        state.next_id += 1;
        state.sources.push(MixSource {
            id,
            start_sample: (start_at * self.stream_rate as f64).round() as u64,
            samples,
        });
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut state) = self.state.lock() {
            state.sources.retain(|s| s.id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_filter_device() {
        assert!(should_filter_device("surround51"));
        assert!(should_filter_device("front:CARD=PCH"));
        assert!(should_filter_device("HDMI Output"));
        assert!(should_filter_device("Digital Output S/PDIF"));
        assert!(!should_filter_device("pipewire"));
        assert!(!should_filter_device("PulseAudio"));
        assert!(!should_filter_device("Built-in Audio"));
    }

    #[test]
    fn test_is_preferred_device() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PipeWire"));
        assert!(is_preferred_device("pulse"));
        assert!(is_preferred_device("PulseAudio"));
        assert!(!is_preferred_device("hw:0,0"));
        assert!(!is_preferred_device("default"));
    }

    #[test]
    fn test_convert_passthrough_mono_16khz() {
        let samples = vec![0.1, -0.1, 0.2];
        assert_eq!(convert_to_mono_16khz(&samples, 1, 16_000), samples);
    }

    #[test]
    fn test_convert_downmixes_stereo() {
        let samples = vec![0.4, 0.0, -0.4, 0.0];
        let mono = convert_to_mono_16khz(&samples, 2, 16_000);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.2).abs() < 1e-6);
        assert!((mono[1] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mix_output_sums_overlapping_sources() {
        let state = Arc::new(Mutex::new(MixerState {
            clock_samples: 0,
            next_id: 2,
            sources: vec![
                MixSource {
                    id: SourceId(0),
                    start_sample: 0,
                    samples: vec![0.25; 4],
                },
                MixSource {
                    id: SourceId(1),
                    start_sample: 2,
                    samples: vec![0.25; 4],
                },
            ],
        }));

        let mut data = vec![0.0f32; 8];
        mix_output(&state, &mut data, 1);

        assert!((data[0] - 0.25).abs() < 1e-6);
        assert!((data[2] - 0.5).abs() < 1e-6);
        assert!((data[5] - 0.25).abs() < 1e-6);
        assert_eq!(data[7], 0.0);

        let state = state.lock().unwrap();
        assert_eq!(state.clock_samples, 8);
        // Both sources played out and were pruned.
        assert!(state.sources.is_empty());
    }

    #[test]
    fn test_mix_output_duplicates_mono_across_channels() {
        let state = Arc::new(Mutex::new(MixerState {
            clock_samples: 0,
            next_id: 1,
            sources: vec![MixSource {
                id: SourceId(0),
                start_sample: 0,
                samples: vec![0.5, -0.5],
            }],
        }));

        let mut data = vec![0.0f32; 4]; // 2 frames, stereo
        mix_output(&state, &mut data, 2);
        assert_eq!(data, vec![0.5, 0.5, -0.5, -0.5]);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_list_input_devices_returns_at_least_one_device() {
        let devices = list_input_devices();
        assert!(devices.is_ok());
        assert!(!devices.unwrap().is_empty());
    }

    #[test]
    fn test_create_with_invalid_device_name() {
        let source = CpalCaptureSource::new(Some("NonExistentDevice12345"));
        assert!(source.is_err());
        match source {
            Err(OutcallError::AudioDeviceNotFound { device }) => {
                assert_eq!(device, "NonExistentDevice12345");
            }
            _ => panic!("Expected AudioDeviceNotFound error"),
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_capture_start_stop_multiple_times() {
        let mut source = CpalCaptureSource::new(None).expect("Failed to create capture source");

        for _ in 0..3 {
            assert!(source.start().is_ok());
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(source.stop().is_ok());
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_playback_sink_clock_advances() {
        let sink = CpalPlaybackSink::new().expect("Failed to create playback sink");
        let t0 = sink.current_time();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(sink.current_time() > t0);
    }
}
