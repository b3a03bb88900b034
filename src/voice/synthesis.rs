//! Per-utterance channel to the speech synthesis service

use crate::channels::{ChannelKind, ChannelLink, Connector, Frame, OutboundQueue};
use crate::events::{EventSender, UtteranceId};
use crate::voice::pcm::PcmFrameDecoder;
use crate::voice::scheduler::{AudioOutput, PlaybackScheduler, ScheduledUnit};

/// Marks the end of an utterance's text on the synthesis channel
pub const END_OF_SPEECH: &str = "<END>";

/// Connection state of a synthesis channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Connecting,
    Open,
    Closed,
    Failed,
}

/// Sends text chunks for synthesis and schedules the audio that comes back
///
/// Chunks submitted before the connection opens are held and sent in order
/// once it does. The end marker goes through the same queue, so it is
/// always the last thing sent.
pub struct SynthesisChannel {
    link: ChannelLink,
    queue: OutboundQueue<String>,
    decoder: PcmFrameDecoder,
    state: SynthesisState,
    ended: bool,
    sent: usize,
}

impl SynthesisChannel {
    /// Start connecting a fresh synthesis channel for `utterance`
    #[must_use]
    pub fn open(connector: &dyn Connector, utterance: UtteranceId, events: EventSender) -> Self {
        let link = connector.connect(ChannelKind::Synthesis, utterance, events);
        Self {
            link,
            queue: OutboundQueue::new(),
            decoder: PcmFrameDecoder::new(),
            state: SynthesisState::Connecting,
            ended: false,
            sent: 0,
        }
    }

    /// Submit a chunk of text to be spoken
    pub fn enqueue(&mut self, chunk: String) {
        if self.ended {
            tracing::warn!(utterance = %self.link.utterance(), "chunk after end of speech dropped");
            return;
        }
        if self.is_finished() {
            tracing::trace!(utterance = %self.link.utterance(), "synthesis channel gone, chunk dropped");
            return;
        }

        let ready = self.queue.push(chunk);
        self.transmit(ready);
    }

    /// Signal that no further chunks will follow
    pub fn end_of_stream(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        let ready = self.queue.push(END_OF_SPEECH.to_string());
        self.transmit(ready);
    }

    /// The connection opened: flush the backlog in submission order
    pub fn on_open(&mut self) {
        if self.state != SynthesisState::Connecting {
            return;
        }
        self.state = SynthesisState::Open;

        let backlog = self.queue.mark_open();
        tracing::debug!(
            utterance = %self.link.utterance(),
            queued = backlog.len(),
            "synthesis channel open"
        );
        self.transmit(backlog);
    }

    /// Decode an inbound audio frame and schedule it for playback
    pub fn on_frame<O: AudioOutput>(
        &mut self,
        frame: Frame,
        scheduler: &mut PlaybackScheduler<O>,
    ) -> Option<ScheduledUnit> {
        match frame {
            Frame::Binary(bytes) => {
                let buffer = self.decoder.decode(&bytes);
                scheduler.schedule(buffer)
            }
            Frame::Text(text) => {
                tracing::trace!(len = text.len(), "ignoring text frame on synthesis channel");
                None
            }
        }
    }

    /// The remote side closed the channel
    pub fn on_closed(&mut self) {
        let dropped = self.queue.close();
        if dropped > 0 {
            tracing::debug!(dropped, "synthesis channel closed with unsent chunks");
        }
        self.state = SynthesisState::Closed;
    }

    /// The channel failed; later chunks are dropped
    pub fn on_failed(&mut self, reason: &str) {
        let dropped = self.queue.close();
        tracing::warn!(
            utterance = %self.link.utterance(),
            reason,
            dropped,
            "synthesis channel failed"
        );
        self.state = SynthesisState::Failed;
    }

    /// Close locally, discarding unsent chunks; scheduled audio is untouched
    pub fn close(&mut self) {
        let dropped = self.queue.close();
        if !self.is_finished() {
            self.link.close();
            self.state = SynthesisState::Closed;
        }
        tracing::debug!(utterance = %self.link.utterance(), dropped, "synthesis channel discarded");
    }

    fn transmit(&mut self, items: Vec<String>) {
        for item in items {
            self.link.send_text(item);
            self.sent += 1;
        }
    }

    #[must_use]
    pub const fn state(&self) -> SynthesisState {
        self.state
    }

    /// Closed or failed
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, SynthesisState::Closed | SynthesisState::Failed)
    }

    /// Messages written to the channel so far, including the end marker
    #[must_use]
    pub const fn sent_count(&self) -> usize {
        self.sent
    }

    /// Audio frames received so far
    #[must_use]
    pub const fn frames_received(&self) -> u64 {
        self.decoder.frames_decoded()
    }
}
