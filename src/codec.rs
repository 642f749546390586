//! Audio codec utilities.
//!
//! Converts raw PCM between the float samples used inside the pipeline and
//! the transport form the streaming speech service exchanges: base64 text
//! carrying little-endian 16-bit signed PCM.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::audio::playback::AudioBuffer;
use crate::error::{OutcallError, Result};

/// Encodes raw bytes into the transport-safe text form.
///
/// Round-trips exactly through [`decode_transport`] for every byte
/// sequence, including the empty one.
pub fn encode_transport(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes the transport text form back into raw bytes.
///
/// # Errors
/// Returns `OutcallError::Decode` on malformed input (invalid alphabet
/// or padding).
pub fn decode_transport(text: &str) -> Result<Vec<u8>> {
    BASE64.decode(text).map_err(|e| OutcallError::Decode {
        message: format!("invalid transport encoding: {}", e),
    })
}

/// Converts float samples in [-1, 1] to packed little-endian 16-bit PCM.
///
/// Each sample is scaled by 32768 and rounded. Samples at or near ±1.0 are
/// clamped to the i16 range: 1.0 * 32768 would otherwise overflow.
pub fn pcm16_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let scaled = (s * 32768.0).round();
        let clamped = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&clamped.to_le_bytes());
    }
    bytes
}

/// Decodes raw little-endian 16-bit PCM bytes into a playable buffer.
///
/// Each sample is normalized to [-1, 1] by dividing by 32768. Interleaved
/// samples are split round-robin across `channel_count` channels. Byte
/// lengths that are not a multiple of `2 * channel_count` are handled by
/// truncating the incomplete trailing sample group rather than failing.
///
/// # Errors
/// Returns `OutcallError::Decode` if `channel_count` is zero.
pub fn decode_pcm_buffer(
    bytes: &[u8],
    sample_rate_hz: u32,
    channel_count: usize,
) -> Result<AudioBuffer> {
    if channel_count == 0 {
        return Err(OutcallError::Decode {
            message: "channel count must be non-zero".to_string(),
        });
    }

    let bytes_per_group = 2 * channel_count;
    let complete_groups = bytes.len() / bytes_per_group;

    let mut channels = vec![Vec::with_capacity(complete_groups); channel_count];
    for group in 0..complete_groups {
        let base = group * bytes_per_group;
        for (ch, channel) in channels.iter_mut().enumerate() {
            let offset = base + ch * 2;
            let raw = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            channel.push(raw as f32 / 32768.0);
        }
    }

    Ok(AudioBuffer::new(channels, sample_rate_hz))
}
