//! Streaming reply generation
//!
//! A [`ChatStreamConsumer`] owns one utterance's generation channel and the
//! synthesis channel its reply is spoken through. Fragments are segmented
//! into sentences as they arrive, so the first sentence is spoken before the
//! reply is complete.

mod segmenter;

use serde::Serialize;

pub use segmenter::{SentenceSegmenter, TERMINATORS};

use crate::Result;
use crate::channels::{ChannelEvent, ChannelKind, ChannelLink, Connector, Frame, OutboundQueue};
use crate::events::{EventSender, UtteranceId};
use crate::presenter::{FAILURE_TEXT, Presenter};
use crate::voice::{AudioOutput, PlaybackScheduler, ScheduledUnit, SynthesisChannel};

/// Sent by the generation service after the last fragment
pub const RESPONSE_COMPLETE: &str = "<RESPCOMPLETE>";

/// Request sent once the generation channel opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// Backend to answer with (e.g. "chatgpt", "claude")
    pub model: String,
    /// System prompt
    pub prompt: String,
    /// Transcribed user utterance
    pub query: String,
}

/// Where a generation stream stands after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamProgress {
    /// No reply text yet
    Pending,
    /// Reply text is arriving
    Streaming,
    /// Completion marker received
    Completed,
    /// Channel failed or closed before completion
    Failed,
}

/// Consumes one utterance's reply stream and forwards it to synthesis
pub struct ChatStreamConsumer {
    utterance: UtteranceId,
    link: ChannelLink,
    request: OutboundQueue<String>,
    segmenter: SentenceSegmenter,
    response: String,
    entry_added: bool,
    progress: StreamProgress,
    synthesis: SynthesisChannel,
}

impl ChatStreamConsumer {
    /// Open the generation and synthesis channels for `utterance`
    ///
    /// The request is sent as soon as the generation channel opens.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be serialized
    pub fn start(
        connector: &dyn Connector,
        utterance: UtteranceId,
        events: &EventSender,
        request: &ChatRequest,
    ) -> Result<Self> {
        let body = serde_json::to_string(request)?;

        let link = connector.connect(ChannelKind::Generation, utterance, events.clone());
        let synthesis = SynthesisChannel::open(connector, utterance, events.clone());

        let mut queue = OutboundQueue::new();
        let ready = queue.push(body);
        debug_assert!(ready.is_empty());

        tracing::debug!(utterance = %utterance, model = %request.model, "generation requested");

        Ok(Self {
            utterance,
            link,
            request: queue,
            segmenter: SentenceSegmenter::new(),
            response: String::new(),
            entry_added: false,
            progress: StreamProgress::Pending,
            synthesis,
        })
    }

    /// Handle an event from the generation channel
    pub fn on_generation_event(
        &mut self,
        event: ChannelEvent,
        presenter: &mut dyn Presenter,
    ) -> StreamProgress {
        if self.is_settled() {
            tracing::trace!(utterance = %self.utterance, ?event, "generation event after stream settled");
            return self.progress;
        }

        match event {
            ChannelEvent::Opened => {
                for body in self.request.mark_open() {
                    self.link.send_text(body);
                }
                tracing::debug!(utterance = %self.utterance, "generation channel open, request sent");
                self.progress
            }
            ChannelEvent::Frame(Frame::Text(fragment)) => self.on_fragment(&fragment, presenter),
            ChannelEvent::Frame(Frame::Binary(data)) => {
                tracing::warn!(len = data.len(), "unexpected binary frame on generation channel");
                self.progress
            }
            ChannelEvent::Closed => self.fail("closed before completion", presenter),
            ChannelEvent::Failed(reason) => self.fail(&reason, presenter),
        }
    }

    /// Handle one text fragment of the reply
    pub fn on_fragment(&mut self, fragment: &str, presenter: &mut dyn Presenter) -> StreamProgress {
        if self.is_settled() {
            return self.progress;
        }
        if fragment == RESPONSE_COMPLETE {
            return self.complete();
        }

        if !self.entry_added {
            presenter.add_transcript_entry("");
            self.entry_added = true;
        }

        for chunk in self.segmenter.feed(fragment) {
            tracing::debug!(utterance = %self.utterance, chunk = %chunk, "sentence ready");
            self.synthesis.enqueue(chunk);
        }

        self.response.push_str(fragment);
        presenter.update_transcript_entry(&self.response);

        self.progress = StreamProgress::Streaming;
        self.progress
    }

    /// Handle an event from the synthesis channel
    pub fn on_synthesis_event<O: AudioOutput>(
        &mut self,
        event: ChannelEvent,
        scheduler: &mut PlaybackScheduler<O>,
    ) -> Option<ScheduledUnit> {
        match event {
            ChannelEvent::Opened => self.synthesis.on_open(),
            ChannelEvent::Frame(frame) => return self.synthesis.on_frame(frame, scheduler),
            ChannelEvent::Closed => self.synthesis.on_closed(),
            ChannelEvent::Failed(reason) => self.synthesis.on_failed(&reason),
        }
        None
    }

    /// Abandon the stream: close both channels without sending anything more
    pub fn cancel(&mut self) {
        self.request.close();
        if !self.is_settled() {
            self.link.close();
            self.progress = StreamProgress::Failed;
        }
        self.synthesis.close();
        tracing::debug!(utterance = %self.utterance, "generation stream cancelled");
    }

    fn complete(&mut self) -> StreamProgress {
        if let Some(rest) = self.segmenter.flush() {
            tracing::debug!(utterance = %self.utterance, chunk = %rest, "final chunk");
            self.synthesis.enqueue(rest);
        }

        self.link.close();
        self.synthesis.end_of_stream();
        self.progress = StreamProgress::Completed;

        tracing::info!(
            utterance = %self.utterance,
            chars = self.response.chars().count(),
            "response complete"
        );
        self.progress
    }

    fn fail(&mut self, reason: &str, presenter: &mut dyn Presenter) -> StreamProgress {
        tracing::warn!(utterance = %self.utterance, reason, "generation channel failed");

        if self.entry_added {
            let partial = self.response.trim_end();
            if partial.is_empty() {
                presenter.update_transcript_entry(FAILURE_TEXT);
            } else {
                presenter.update_transcript_entry(&format!("{partial}\n{FAILURE_TEXT}"));
            }
        } else {
            presenter.add_transcript_entry(FAILURE_TEXT);
            self.entry_added = true;
        }

        if let Some(discarded) = self.segmenter.flush() {
            tracing::debug!(chars = discarded.len(), "unterminated text discarded");
        }
        self.request.close();
        self.link.close();
        self.synthesis.end_of_stream();

        self.progress = StreamProgress::Failed;
        self.progress
    }

    fn is_settled(&self) -> bool {
        matches!(self.progress, StreamProgress::Completed | StreamProgress::Failed)
    }

    #[must_use]
    pub const fn progress(&self) -> StreamProgress {
        self.progress
    }

    /// Reply text accumulated so far
    #[must_use]
    pub fn response(&self) -> &str {
        &self.response
    }

    /// Generation settled and the synthesis channel is gone
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.is_settled() && self.synthesis.is_finished()
    }

    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        self.utterance
    }
}
