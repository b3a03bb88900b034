//! PCM frame decoding for synthesized speech

/// Sample rate of synthesized speech frames
pub const SYNTHESIS_SAMPLE_RATE: u32 = 22050;

/// Normalization divisor for 16-bit synthesis samples.
///
/// The synthesis backend's frames are scaled against a 14-bit full-scale
/// reference, so decoded samples may exceed unit amplitude.
pub const PCM_SCALE: f32 = 16384.0;

/// Decoded samples of one inbound frame, tagged with its arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct PcmSampleBuffer {
    /// Arrival order of the frame within its channel
    pub sequence: u64,
    /// Normalized samples
    pub samples: Vec<f32>,
}

impl PcmSampleBuffer {
    /// Playback duration in seconds at the synthesis sample rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(SYNTHESIS_SAMPLE_RATE)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Converts binary synthesis frames into sample buffers in arrival order
#[derive(Debug, Default)]
pub struct PcmFrameDecoder {
    next_sequence: u64,
}

impl PcmFrameDecoder {
    #[must_use]
    pub const fn new() -> Self {
        Self { next_sequence: 0 }
    }

    /// Decode one frame, assigning it the next arrival sequence number
    pub fn decode(&mut self, frame: &[u8]) -> PcmSampleBuffer {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let samples = decode_pcm16(frame);
        tracing::trace!(sequence, samples = samples.len(), "decoded pcm frame");

        PcmSampleBuffer { sequence, samples }
    }

    /// Number of frames decoded so far
    #[must_use]
    pub const fn frames_decoded(&self) -> u64 {
        self.next_sequence
    }
}

/// Interpret bytes as signed 16-bit little-endian samples and normalize them.
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn decode_pcm16(frame: &[u8]) -> Vec<f32> {
    frame
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM_SCALE)
        .collect()
}
