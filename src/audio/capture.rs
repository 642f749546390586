//! Capture pipeline: float samples in, transport-ready chunks out.

use crate::codec::{encode_transport, pcm16_from_f32};
use crate::defaults::{CAPTURE_FRAME_SAMPLES, INPUT_MIME_TYPE};

/// A frame of uplink audio in the form the speech service accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioChunk {
    /// Base64 text carrying little-endian 16-bit PCM.
    pub data: String,
    /// MIME tag naming the payload format and sample rate.
    pub mime_type: String,
}

/// Accumulates capture samples and cuts them into fixed-size encoded frames.
///
/// Samples arrive in arbitrary batch sizes from the capture thread; the
/// pipeline buffers the remainder between calls so every emitted chunk
/// holds exactly one full frame.
pub struct CapturePipeline {
    frame_samples: usize,
    pending: Vec<f32>,
}

impl CapturePipeline {
    pub fn new() -> Self {
        Self::with_frame_samples(CAPTURE_FRAME_SAMPLES)
    }

    pub fn with_frame_samples(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            pending: Vec::new(),
        }
    }

    /// Feeds a batch of samples in, returning zero or more complete frames.
    pub fn push_samples(&mut self, samples: &[f32]) -> Vec<EncodedAudioChunk> {
        self.pending.extend_from_slice(samples);

        let mut chunks = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            chunks.push(EncodedAudioChunk {
                data: encode_transport(&pcm16_from_f32(&frame)),
                mime_type: INPUT_MIME_TYPE.to_string(),
            });
        }
        chunks
    }

    /// Number of buffered samples awaiting a full frame.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Discards any buffered partial frame.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}
