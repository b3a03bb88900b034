//! Speaker output driven by a sample-counting clock

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, SupportedStreamConfigRange};

use crate::voice::pcm::SYNTHESIS_SAMPLE_RATE;
use crate::voice::scheduler::AudioOutput;
use crate::{Error, Result};

struct Unit {
    start_frame: u64,
    samples: Vec<f32>,
}

impl Unit {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Scheduled audio laid out on a frame timeline
///
/// The clock is the number of frames rendered so far; units are rendered
/// when the clock reaches their start frame.
#[derive(Default)]
pub struct Timeline {
    frames_rendered: u64,
    units: VecDeque<Unit>,
}

impl Timeline {
    /// Place samples starting at `start_frame`
    ///
    /// A unit never starts before the frames already rendered, nor inside
    /// the last queued unit; it is pushed later instead of losing its head.
    pub fn insert(&mut self, start_frame: u64, samples: Vec<f32>) {
        let mut start_frame = start_frame.max(self.frames_rendered);
        if let Some(last) = self.units.back().filter(|u| u.start_frame <= start_frame) {
            start_frame = start_frame.max(last.end_frame());
        }

        let at = self
            .units
            .iter()
            .position(|u| u.start_frame > start_frame)
            .unwrap_or(self.units.len());
        self.units.insert(at, Unit { start_frame, samples });
    }

    /// Render interleaved output, writing the same sample to every channel
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let now = self.frames_rendered;
            while self.units.front().is_some_and(|u| u.end_frame() <= now) {
                self.units.pop_front();
            }

            let sample = match self.units.front() {
                Some(unit) if unit.start_frame <= now => usize::try_from(now - unit.start_frame)
                    .ok()
                    .and_then(|offset| unit.samples.get(offset))
                    .copied()
                    .unwrap_or(0.0),
                _ => 0.0,
            };

            frame.fill(sample);
            self.frames_rendered += 1;
        }
    }

    /// Drop every unit not yet fully rendered
    pub fn clear(&mut self) {
        self.units.clear();
    }

    #[must_use]
    pub const fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Units still waiting to play or playing
    #[must_use]
    pub fn pending_units(&self) -> usize {
        self.units.len()
    }
}

/// Default output device rendering a [`Timeline`] at the synthesis rate
pub struct DeviceOutput {
    timeline: Arc<Mutex<Timeline>>,
    _stream: Stream,
}

impl DeviceOutput {
    /// Open the default output device at 22050 Hz
    ///
    /// # Errors
    ///
    /// Returns error if no output configuration supports the synthesis rate
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(SYNTHESIS_SAMPLE_RATE);
        let supports = |channels: u16, c: &SupportedStreamConfigRange| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        };

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(1, c))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(2, c))
            })
            .ok_or_else(|| Error::Audio("output device cannot play 22050 Hz".to_string()))?;

        let config = supported.with_sample_rate(rate).config();
        let channels = usize::from(config.channels);

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let render_timeline = Arc::clone(&timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut timeline) = render_timeline.lock() {
                        timeline.render(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "speaker stream error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate = SYNTHESIS_SAMPLE_RATE,
            channels,
            "speaker opened"
        );

        Ok(Self {
            timeline,
            _stream: stream,
        })
    }

    /// Units not yet fully played
    #[must_use]
    pub fn pending_units(&self) -> usize {
        self.timeline.lock().map(|t| t.pending_units()).unwrap_or(0)
    }
}

impl AudioOutput for DeviceOutput {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        let frames = self.timeline.lock().map(|t| t.frames_rendered()).unwrap_or(0);
        frames as f64 / f64::from(SYNTHESIS_SAMPLE_RATE)
    }

    fn sample_rate(&self) -> u32 {
        SYNTHESIS_SAMPLE_RATE
    }

    fn start_at(&mut self, samples: Vec<f32>, start: f64) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let start_frame = (start * f64::from(SYNTHESIS_SAMPLE_RATE)).round().max(0.0) as u64;
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.insert(start_frame, samples);
        }
    }

    fn clear(&mut self) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.clear();
        }
    }
}
