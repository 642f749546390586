//! Default configuration constants for outcall.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

/// Microphone capture sample rate in Hz.
///
/// 16kHz is the standard for speech recognition input and matches the
/// format the streaming speech service expects on its uplink.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Agent audio playback sample rate in Hz.
///
/// The speech service synthesizes agent audio at 24kHz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Number of samples per capture frame.
///
/// At 16kHz this is 256ms of audio per frame, matching the cadence of the
/// platform audio-processing callback.
pub const CAPTURE_FRAME_SAMPLES: usize = 4096;

/// MIME tag attached to every uplink audio chunk.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Maximum length of the summary stored on a lead when a call ends.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Delay before an ended call resets back to idle, in milliseconds.
///
/// Purely cosmetic: gives the caller a moment to see the "ended" state
/// before the controller becomes available for the next call.
pub const ENDED_RESET_DELAY_MS: u64 = 2000;

/// Default speech model identifier.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Default synthesized voice for the agent.
pub const DEFAULT_VOICE: &str = "Puck";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_is_256ms() {
        let ms = CAPTURE_FRAME_SAMPLES as u32 * 1000 / INPUT_SAMPLE_RATE;
        assert_eq!(ms, 256);
    }

    #[test]
    fn input_mime_names_input_rate() {
        assert!(INPUT_MIME_TYPE.contains("16000"));
    }
}
