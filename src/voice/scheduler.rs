//! Gapless playback scheduling against an audio clock

use crate::voice::pcm::{PcmSampleBuffer, SYNTHESIS_SAMPLE_RATE};
use crate::{Error, Result};

/// An audio output device with its own clock
///
/// Times are seconds on the device clock.
pub trait AudioOutput {
    /// Current time of the device clock
    fn current_time(&self) -> f64;

    /// Sample rate the device renders at
    fn sample_rate(&self) -> u32;

    /// Schedule `samples` to begin playing at `start`
    fn start_at(&mut self, samples: Vec<f32>, start: f64);

    /// Drop every unit that has not finished playing
    fn clear(&mut self);
}

/// Where a buffer was placed on the audio clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    /// Arrival order of the source frame
    pub sequence: u64,
    /// Start time on the audio clock
    pub start: f64,
    /// Playback duration in seconds
    pub duration: f64,
}

impl ScheduledUnit {
    /// Time at which this unit stops playing
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Schedules decoded buffers back-to-back on a single audio output
///
/// Owns the only scheduling cursor for its output. Invariant after every
/// step: `next_start_time >= output.current_time()`.
pub struct PlaybackScheduler<O: AudioOutput> {
    output: O,
    next_start_time: f64,
    scheduled: u64,
    resets: u64,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    /// Create a scheduler whose cursor starts at the output's current time
    ///
    /// # Errors
    ///
    /// Returns error if the output does not render at the synthesis sample rate
    pub fn new(output: O) -> Result<Self> {
        if output.sample_rate() != SYNTHESIS_SAMPLE_RATE {
            return Err(Error::Audio(format!(
                "output renders at {} Hz, synthesis audio is {SYNTHESIS_SAMPLE_RATE} Hz",
                output.sample_rate()
            )));
        }

        let next_start_time = output.current_time();
        Ok(Self {
            output,
            next_start_time,
            scheduled: 0,
            resets: 0,
        })
    }

    /// Schedule a buffer immediately after everything scheduled before it.
    ///
    /// If the cursor has fallen behind the clock the buffer starts now,
    /// leaving a gap instead of playing late. Empty buffers are skipped.
    pub fn schedule(&mut self, buffer: PcmSampleBuffer) -> Option<ScheduledUnit> {
        if buffer.is_empty() {
            return None;
        }

        let now = self.output.current_time();
        if self.next_start_time < now {
            tracing::debug!(
                behind = now - self.next_start_time,
                sequence = buffer.sequence,
                "playback cursor behind clock, resetting"
            );
            self.next_start_time = now;
            self.resets += 1;
        }

        let unit = ScheduledUnit {
            sequence: buffer.sequence,
            start: self.next_start_time,
            duration: buffer.duration(),
        };

        self.output.start_at(buffer.samples, unit.start);
        self.next_start_time += unit.duration;
        self.scheduled += 1;

        tracing::trace!(
            sequence = unit.sequence,
            start = unit.start,
            duration = unit.duration,
            "scheduled playback unit"
        );

        Some(unit)
    }

    /// Drop pending audio and move the cursor to the current clock time
    pub fn discard(&mut self) {
        self.output.clear();
        self.next_start_time = self.output.current_time();
        tracing::debug!(scheduled = self.scheduled, "playback schedule discarded");
    }

    /// Clock time at which the next buffer will start (if not behind)
    #[must_use]
    pub const fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    /// Seconds of audio scheduled but not yet played
    #[must_use]
    pub fn pending_duration(&self) -> f64 {
        (self.next_start_time - self.output.current_time()).max(0.0)
    }

    /// Number of buffers scheduled so far
    #[must_use]
    pub const fn scheduled_count(&self) -> u64 {
        self.scheduled
    }

    /// Number of times the cursor was reset forward to the clock
    #[must_use]
    pub const fn reset_count(&self) -> u64 {
        self.resets
    }

    #[must_use]
    pub const fn output(&self) -> &O {
        &self.output
    }

    pub const fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}
