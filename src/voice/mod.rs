//! Voice processing module
//!
//! Handles microphone capture and speech detection, transcription,
//! synthesis channels, and gapless playback of synthesized audio.

mod capture;
mod pcm;
mod playback;
mod scheduler;
mod stt;
mod synthesis;
mod vad;

pub use capture::{AudioCapture, CAPTURE_SAMPLE_RATE, signal_level, write_wav};
pub use pcm::{PCM_SCALE, PcmFrameDecoder, PcmSampleBuffer, SYNTHESIS_SAMPLE_RATE, decode_pcm16};
pub use playback::{DeviceOutput, Timeline};
pub use scheduler::{AudioOutput, PlaybackScheduler, ScheduledUnit};
pub use stt::{HttpTranscriber, Transcriber, Transcription, encode_samples};
pub use synthesis::{END_OF_SPEECH, SynthesisChannel, SynthesisState};
pub use vad::{EnergyVad, FRAME_SAMPLES, MicVad, VadEvent, VoiceActivityDetector};
