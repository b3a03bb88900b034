//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::time::Duration;

use murmur::config::VadConfig;
use murmur::voice::{
    AudioOutput, CAPTURE_SAMPLE_RATE, EnergyVad, HttpTranscriber, PcmFrameDecoder,
    PlaybackScheduler, SYNTHESIS_SAMPLE_RATE, Timeline, Transcriber, VadEvent,
};

mod common;

use common::{ManualOutput, pcm_frame, sine};

fn speech(secs: f32) -> Vec<f32> {
    sine(220.0, secs, 0.3, CAPTURE_SAMPLE_RATE)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn silence(secs: f32) -> Vec<f32> {
    vec![0.0; (CAPTURE_SAMPLE_RATE as f32 * secs) as usize]
}

#[test]
fn test_vad_segments_speech_between_silence() {
    let mut vad = EnergyVad::new(VadConfig::default());

    let mut events = vad.feed(&silence(0.48));
    assert!(events.is_empty());

    events.extend(vad.feed(&speech(0.96)));
    assert!(matches!(events.as_slice(), [VadEvent::SpeechStart]));
    assert!(vad.is_speaking());

    events.extend(vad.feed(&silence(0.96)));
    assert_eq!(events.len(), 2);
    let VadEvent::SpeechEnd(samples) = &events[1] else {
        panic!("expected speech end, got {:?}", events[1]);
    };
    assert!(samples.len() >= 15_360);
    assert!(!vad.is_speaking());
}

#[test]
fn test_vad_click_is_misfire() {
    let mut vad = EnergyVad::new(VadConfig::default());

    let mut events = vad.feed(&speech(0.09));
    events.extend(vad.feed(&silence(0.96)));

    assert!(matches!(
        events.as_slice(),
        [VadEvent::SpeechStart, VadEvent::Misfire]
    ));
}

#[test]
fn test_vad_two_utterances() {
    let mut vad = EnergyVad::new(VadConfig::default());

    let mut audio = speech(0.48);
    audio.extend(silence(0.96));
    audio.extend(speech(0.48));
    audio.extend(silence(0.96));

    let ends = vad
        .feed(&audio)
        .into_iter()
        .filter(|e| matches!(e, VadEvent::SpeechEnd(_)))
        .count();
    assert_eq!(ends, 2);
}

#[test]
fn test_vad_quiet_room_threshold() {
    let config = VadConfig {
        energy_threshold: 0.5,
        ..VadConfig::default()
    };
    let mut vad = EnergyVad::new(config);

    assert!(vad.feed(&speech(0.96)).is_empty());
}

#[test]
fn test_decoded_frames_play_back_to_back() {
    let mut scheduler = PlaybackScheduler::new(ManualOutput::default()).unwrap();
    let mut decoder = PcmFrameDecoder::new();

    let first = scheduler.schedule(decoder.decode(&pcm_frame(1102))).unwrap();
    scheduler.output_mut().now = 0.010;
    let second = scheduler.schedule(decoder.decode(&pcm_frame(1102))).unwrap();

    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 1);
    assert!((second.start - first.end()).abs() < 1e-12);
    assert!((second.start - 0.05).abs() < 1e-3);
    assert_eq!(scheduler.reset_count(), 0);
}

#[test]
fn test_late_frame_starts_now() {
    let mut scheduler = PlaybackScheduler::new(ManualOutput::default()).unwrap();
    let mut decoder = PcmFrameDecoder::new();

    scheduler.schedule(decoder.decode(&pcm_frame(1102)));
    scheduler.output_mut().now = 0.5;
    let late = scheduler.schedule(decoder.decode(&pcm_frame(1102))).unwrap();

    assert!((late.start - 0.5).abs() < 1e-12);
    assert_eq!(scheduler.reset_count(), 1);
    assert!(scheduler.next_start_time() >= scheduler.output().now);
}

#[test]
fn test_odd_trailing_byte_ignored() {
    let mut decoder = PcmFrameDecoder::new();
    let mut frame = pcm_frame(4);
    frame.push(0x7f);

    let buffer = decoder.decode(&frame);
    assert_eq!(buffer.samples.len(), 4);
    assert!((buffer.samples[0] - 1000.0 / 16384.0).abs() < 1e-6);
}

/// Output rendering into a timeline, advanced by the test
#[derive(Default)]
struct TimelineOutput {
    timeline: Timeline,
}

impl AudioOutput for TimelineOutput {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        self.timeline.frames_rendered() as f64 / f64::from(SYNTHESIS_SAMPLE_RATE)
    }

    fn sample_rate(&self) -> u32 {
        SYNTHESIS_SAMPLE_RATE
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn start_at(&mut self, samples: Vec<f32>, start: f64) {
        let frame = (start * f64::from(SYNTHESIS_SAMPLE_RATE)).round() as u64;
        self.timeline.insert(frame, samples);
    }

    fn clear(&mut self) {
        self.timeline.clear();
    }
}

#[test]
fn test_scheduled_frames_render_without_gaps() {
    let mut scheduler = PlaybackScheduler::new(TimelineOutput::default()).unwrap();
    let mut decoder = PcmFrameDecoder::new();

    for _ in 0..3 {
        scheduler.schedule(decoder.decode(&pcm_frame(100)));
    }

    let mut out = vec![0.0; 300 * 2];
    scheduler.output_mut().timeline.render(&mut out, 2);

    let expected = 1000.0 / 16384.0;
    assert!(out.iter().all(|s| (s - expected).abs() < 1e-6));
    assert!(scheduler.pending_duration() < 1e-12);
}

#[test]
fn test_discard_silences_timeline() {
    let mut scheduler = PlaybackScheduler::new(TimelineOutput::default()).unwrap();
    let mut decoder = PcmFrameDecoder::new();

    scheduler.schedule(decoder.decode(&pcm_frame(400)));
    let mut out = vec![0.0; 100];
    scheduler.output_mut().timeline.render(&mut out, 1);
    assert!(out.iter().all(|s| *s > 0.0));

    scheduler.discard();
    assert!((scheduler.next_start_time() - 100.0 / 22050.0).abs() < 1e-12);

    scheduler.output_mut().timeline.render(&mut out, 1);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[tokio::test]
async fn test_transcriber_unreachable_service() {
    let transcriber =
        HttpTranscriber::new("http://127.0.0.1:9/transcribe", Duration::from_secs(2)).unwrap();

    let result = transcriber.transcribe(speech(0.1)).await;
    assert!(result.is_err());
}
