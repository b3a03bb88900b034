//! Voice activity detection
//!
//! The detector is a collaborator of the utterance lifecycle: it only reports
//! where speech starts and ends. [`EnergyVad`] is a simple RMS gate over
//! fixed-size frames; [`MicVad`] drives it from the microphone.

use crate::Result;
use crate::config::VadConfig;
use crate::voice::capture::{AudioCapture, CAPTURE_SAMPLE_RATE, signal_level};

/// Samples per analysis frame (30 ms at 16 kHz)
pub const FRAME_SAMPLES: usize = 480;

/// Speech boundary reported by a detector
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent {
    /// Speech began
    SpeechStart,
    /// Speech ended; carries the whole segment
    SpeechEnd(Vec<f32>),
    /// Segment was too short to be speech and was discarded
    Misfire,
}

/// Source of speech boundary events
pub trait VoiceActivityDetector {
    /// Begin listening
    ///
    /// # Errors
    ///
    /// Returns error if the audio source cannot be started
    fn start(&mut self) -> Result<()>;

    /// Events produced since the last poll, in order
    fn poll(&mut self) -> Vec<VadEvent>;

    /// Stop listening and release the audio source
    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Silent,
    Speaking,
}

/// Energy-gated speech segmenter over 16 kHz samples
pub struct EnergyVad {
    threshold: f32,
    min_speech_samples: usize,
    redemption_samples: usize,
    phase: Phase,
    frame: Vec<f32>,
    segment: Vec<f32>,
    voiced: usize,
    silence: usize,
}

impl EnergyVad {
    #[must_use]
    pub fn new(config: VadConfig) -> Self {
        let min_speech_samples = ms_to_samples(config.min_speech_ms);
        let redemption_samples = ms_to_samples(config.redemption_ms);

        tracing::debug!(
            threshold = config.energy_threshold,
            min_speech_samples,
            redemption_samples,
            "energy vad initialized"
        );

        Self {
            threshold: config.energy_threshold,
            min_speech_samples,
            redemption_samples,
            phase: Phase::Silent,
            frame: Vec::with_capacity(FRAME_SAMPLES),
            segment: Vec::new(),
            voiced: 0,
            silence: 0,
        }
    }

    /// Feed captured samples, returning any boundaries they complete
    pub fn feed(&mut self, samples: &[f32]) -> Vec<VadEvent> {
        let mut events = Vec::new();

        for &sample in samples {
            self.frame.push(sample);
            if self.frame.len() == FRAME_SAMPLES {
                let frame = std::mem::replace(&mut self.frame, Vec::with_capacity(FRAME_SAMPLES));
                if let Some(event) = self.process_frame(frame) {
                    events.push(event);
                }
            }
        }

        events
    }

    fn process_frame(&mut self, frame: Vec<f32>) -> Option<VadEvent> {
        let (energy, _) = signal_level(&frame);
        let is_speech = energy > self.threshold;

        match self.phase {
            Phase::Silent => {
                if !is_speech {
                    return None;
                }
                tracing::trace!(energy, "speech onset");
                self.phase = Phase::Speaking;
                self.voiced = frame.len();
                self.silence = 0;
                self.segment = frame;
                Some(VadEvent::SpeechStart)
            }
            Phase::Speaking => {
                if is_speech {
                    self.voiced += frame.len();
                    self.silence = 0;
                } else {
                    self.silence += frame.len();
                }
                self.segment.extend(frame);

                if self.silence < self.redemption_samples {
                    return None;
                }

                let segment = std::mem::take(&mut self.segment);
                let voiced = self.voiced;
                self.reset();

                if voiced < self.min_speech_samples {
                    tracing::debug!(voiced, "segment too short, misfire");
                    Some(VadEvent::Misfire)
                } else {
                    tracing::debug!(samples = segment.len(), voiced, "speech segment complete");
                    Some(VadEvent::SpeechEnd(segment))
                }
            }
        }
    }

    /// Whether a segment is currently open
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.phase == Phase::Speaking
    }

    /// Forget any partial frame and open segment
    pub fn reset(&mut self) {
        self.phase = Phase::Silent;
        self.frame.clear();
        self.segment.clear();
        self.voiced = 0;
        self.silence = 0;
    }
}

/// Energy VAD fed from the default microphone
pub struct MicVad {
    capture: Option<AudioCapture>,
    detector: EnergyVad,
}

impl MicVad {
    #[must_use]
    pub fn new(config: VadConfig) -> Self {
        Self {
            capture: None,
            detector: EnergyVad::new(config),
        }
    }
}

impl VoiceActivityDetector for MicVad {
    fn start(&mut self) -> Result<()> {
        let mut capture = match self.capture.take() {
            Some(capture) => capture,
            None => AudioCapture::open()?,
        };
        capture.start()?;
        self.capture = Some(capture);
        tracing::info!("listening");
        Ok(())
    }

    fn poll(&mut self) -> Vec<VadEvent> {
        match &self.capture {
            Some(capture) => self.detector.feed(&capture.take_samples()),
            None => Vec::new(),
        }
    }

    fn destroy(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.detector.reset();
        tracing::debug!("vad destroyed");
    }
}

#[allow(clippy::cast_possible_truncation)]
fn ms_to_samples(ms: u64) -> usize {
    (ms * u64::from(CAPTURE_SAMPLE_RATE) / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vad() -> EnergyVad {
        EnergyVad::new(VadConfig {
            energy_threshold: 0.03,
            min_speech_ms: 90,
            redemption_ms: 60,
        })
    }

    fn frames(amplitude: f32, count: usize) -> Vec<f32> {
        vec![amplitude; FRAME_SAMPLES * count]
    }

    #[test]
    fn test_silence_produces_nothing() {
        let mut vad = vad();
        assert!(vad.feed(&frames(0.0, 20)).is_empty());
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_speech_segment() {
        let mut vad = vad();

        let events = vad.feed(&frames(0.2, 4));
        assert_eq!(events, vec![VadEvent::SpeechStart]);
        assert!(vad.is_speaking());

        // 60 ms of silence is two frames
        let events = vad.feed(&frames(0.0, 2));
        assert_eq!(events.len(), 1);
        let VadEvent::SpeechEnd(samples) = &events[0] else {
            panic!("expected speech end, got {events:?}");
        };
        assert_eq!(samples.len(), FRAME_SAMPLES * 6);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_short_burst_is_misfire() {
        let mut vad = vad();
        let mut audio = frames(0.2, 1);
        audio.extend(frames(0.0, 3));

        assert_eq!(vad.feed(&audio), vec![VadEvent::SpeechStart, VadEvent::Misfire]);
    }

    #[test]
    fn test_partial_frames_carry_over() {
        let mut vad = vad();
        let audio = frames(0.2, 1);

        assert!(vad.feed(&audio[..100]).is_empty());
        assert_eq!(vad.feed(&audio[100..]), vec![VadEvent::SpeechStart]);
    }

    #[test]
    fn test_brief_pause_does_not_end_segment() {
        let mut vad = vad();
        let mut audio = frames(0.2, 3);
        audio.extend(frames(0.0, 1));
        audio.extend(frames(0.2, 3));

        assert_eq!(vad.feed(&audio), vec![VadEvent::SpeechStart]);
        assert!(vad.is_speaking());
    }

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(30), FRAME_SAMPLES);
        assert_eq!(ms_to_samples(1000), 16000);
    }
}
