//! Utterance lifecycle
//!
//! Drives each utterance from speech end through transcription, reply
//! generation, and synthesis. Everything arrives as an [`Event`] from the
//! single queue; events tagged with an utterance that is no longer current
//! are ignored.

use std::sync::Arc;

use crate::channels::{ChannelEvent, ChannelKind, Connector};
use crate::chat::{ChatRequest, ChatStreamConsumer, StreamProgress};
use crate::events::{Event, EventSender, UtteranceId};
use crate::presenter::{DetectorState, FAILURE_TEXT, Presenter};
use crate::voice::{AudioOutput, PlaybackScheduler, Transcriber, Transcription, VadEvent};
use crate::{Config, Result};

/// Phase of an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Waiting,
    InSpeech,
    Transcribing,
    Thinking,
    Streaming,
    /// Reply complete; remaining audio is still arriving
    Done,
    Failed,
}

/// Backend and system prompt sent with every query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub model: String,
    pub prompt: String,
}

impl ChatSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.assistant.backend.clone(),
            prompt: config.system_prompt(),
        }
    }
}

struct Utterance {
    id: UtteranceId,
    state: LifecycleState,
    consumer: Option<ChatStreamConsumer>,
}

/// The top-level state machine of the client
pub struct UtteranceLifecycle<O: AudioOutput> {
    current: UtteranceId,
    in_speech: bool,
    active: Option<Utterance>,
    scheduler: PlaybackScheduler<O>,
    connector: Box<dyn Connector>,
    transcriber: Arc<dyn Transcriber>,
    presenter: Box<dyn Presenter>,
    events: EventSender,
    chat: ChatSettings,
    label: Option<DetectorState>,
}

impl<O: AudioOutput> UtteranceLifecycle<O> {
    #[must_use]
    pub fn new(
        scheduler: PlaybackScheduler<O>,
        connector: Box<dyn Connector>,
        transcriber: Arc<dyn Transcriber>,
        presenter: Box<dyn Presenter>,
        events: EventSender,
        chat: ChatSettings,
    ) -> Self {
        let mut lifecycle = Self {
            current: UtteranceId::new(0),
            in_speech: false,
            active: None,
            scheduler,
            connector,
            transcriber,
            presenter,
            events,
            chat,
            label: None,
        };
        lifecycle.refresh_label();
        lifecycle
    }

    /// React to one event from the queue
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Vad(VadEvent::SpeechStart) => self.on_speech_start(),
            Event::Vad(VadEvent::SpeechEnd(samples)) => self.on_speech_end(samples),
            Event::Vad(VadEvent::Misfire) => self.on_misfire(),
            Event::Transcribed { utterance, result } => self.on_transcribed(utterance, result),
            Event::Channel {
                utterance,
                kind,
                event,
            } => self.on_channel_event(utterance, kind, event),
            Event::Shutdown => self.shutdown(),
        }
    }

    /// The user started speaking
    pub fn on_speech_start(&mut self) {
        tracing::debug!("speech start");
        self.in_speech = true;
        self.refresh_label();
    }

    /// The detector discarded a segment as noise
    pub fn on_misfire(&mut self) {
        tracing::debug!("speech was too short, misfire");
        self.in_speech = false;
        self.refresh_label();
    }

    /// The user finished an utterance: supersede the previous one and
    /// start transcribing this one
    pub fn on_speech_end(&mut self, samples: Vec<f32>) {
        self.in_speech = false;

        if let Some(mut previous) = self.active.take() {
            tracing::debug!(utterance = %previous.id, state = ?previous.state, "utterance superseded");
            if let Some(consumer) = previous.consumer.as_mut() {
                consumer.cancel();
            }
        }

        let id = self.current.next();
        self.current = id;
        self.active = Some(Utterance {
            id,
            state: LifecycleState::Transcribing,
            consumer: None,
        });

        tracing::info!(utterance = %id, samples = samples.len(), "speech done, transcribing");

        let transcriber = Arc::clone(&self.transcriber);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = transcriber.transcribe(samples).await;
            let _ = events.send(Event::Transcribed {
                utterance: id,
                result,
            });
        });

        self.refresh_label();
    }

    fn on_transcribed(&mut self, id: UtteranceId, result: Result<Transcription>) {
        if !self.is_current(id, LifecycleState::Transcribing) {
            tracing::debug!(utterance = %id, "stale transcription ignored");
            return;
        }

        match result {
            Err(e) => {
                tracing::warn!(utterance = %id, error = %e, "transcription failed");
                self.presenter.add_transcript_entry(FAILURE_TEXT);
                self.fail();
                self.active = None;
            }
            Ok(transcription) if transcription.is_blank() => {
                tracing::info!(utterance = %id, "empty transcription, nothing to answer");
                self.active = None;
            }
            Ok(transcription) => self.start_reply(id, transcription),
        }

        self.refresh_label();
    }

    fn start_reply(&mut self, id: UtteranceId, transcription: Transcription) {
        self.set_state(LifecycleState::Thinking);
        self.refresh_label();

        let request = ChatRequest {
            model: self.chat.model.clone(),
            prompt: self.chat.prompt.clone(),
            query: transcription.text,
        };

        match ChatStreamConsumer::start(self.connector.as_ref(), id, &self.events, &request) {
            Ok(consumer) => {
                if let Some(utterance) = self.active.as_mut() {
                    utterance.consumer = Some(consumer);
                }
            }
            Err(e) => {
                tracing::error!(utterance = %id, error = %e, "could not start generation");
                self.presenter.add_transcript_entry(FAILURE_TEXT);
                self.fail();
                self.active = None;
            }
        }
    }

    fn on_channel_event(&mut self, id: UtteranceId, kind: ChannelKind, event: ChannelEvent) {
        let Some(utterance) = self.active.as_mut().filter(|u| u.id == id) else {
            tracing::debug!(utterance = %id, kind = %kind, "stale channel event ignored");
            return;
        };
        let Some(consumer) = utterance.consumer.as_mut() else {
            tracing::debug!(utterance = %id, kind = %kind, "channel event before reply started");
            return;
        };

        match kind {
            ChannelKind::Generation => {
                let progress = consumer.on_generation_event(event, self.presenter.as_mut());
                let next = match progress {
                    StreamProgress::Pending => None,
                    StreamProgress::Streaming => Some(LifecycleState::Streaming),
                    StreamProgress::Completed => Some(LifecycleState::Done),
                    StreamProgress::Failed => Some(LifecycleState::Failed),
                };
                if let Some(next) = next.filter(|s| *s != utterance.state) {
                    utterance.state = next;
                    if next == LifecycleState::Failed {
                        self.emit(DetectorState::Failed);
                    }
                }
            }
            ChannelKind::Synthesis => {
                if let Some(unit) = consumer.on_synthesis_event(event, &mut self.scheduler) {
                    tracing::trace!(utterance = %id, sequence = unit.sequence, start = unit.start, "audio scheduled");
                }
            }
        }

        if self
            .active
            .as_ref()
            .and_then(|u| u.consumer.as_ref())
            .is_some_and(ChatStreamConsumer::is_finished)
        {
            tracing::debug!(utterance = %id, "utterance finished");
            self.active = None;
        }

        self.refresh_label();
    }

    /// Tear down: close any open channels and drop pending audio silently
    pub fn shutdown(&mut self) {
        if let Some(mut utterance) = self.active.take() {
            if let Some(consumer) = utterance.consumer.as_mut() {
                consumer.cancel();
            }
        }
        self.in_speech = false;
        self.scheduler.discard();
        self.refresh_label();
        tracing::info!("lifecycle shut down");
    }

    fn is_current(&self, id: UtteranceId, state: LifecycleState) -> bool {
        self.active
            .as_ref()
            .is_some_and(|u| u.id == id && u.state == state)
    }

    fn set_state(&mut self, state: LifecycleState) {
        if let Some(utterance) = self.active.as_mut() {
            utterance.state = state;
        }
    }

    fn fail(&mut self) {
        self.set_state(LifecycleState::Failed);
        self.emit(DetectorState::Failed);
    }

    fn refresh_label(&mut self) {
        let label = if self.in_speech {
            DetectorState::InSpeech
        } else {
            match self.active.as_ref().map(|u| u.state) {
                Some(LifecycleState::Transcribing) => DetectorState::Transcription,
                Some(LifecycleState::Thinking) => DetectorState::Thinking,
                Some(LifecycleState::Streaming) => DetectorState::Streaming,
                Some(LifecycleState::Done) => DetectorState::Speaking,
                _ => DetectorState::Waiting,
            }
        };
        self.emit(label);
    }

    fn emit(&mut self, label: DetectorState) {
        if self.label != Some(label) {
            self.label = Some(label);
            self.presenter.set_detector_state(label);
        }
    }

    /// Overall state: speaking user first, then the in-flight utterance
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        if self.in_speech {
            return LifecycleState::InSpeech;
        }
        self.active
            .as_ref()
            .map_or(LifecycleState::Waiting, |u| u.state)
    }

    /// Identity of the in-flight utterance, if any
    #[must_use]
    pub fn active_utterance(&self) -> Option<UtteranceId> {
        self.active.as_ref().map(|u| u.id)
    }

    /// Label last shown to the user
    #[must_use]
    pub const fn label(&self) -> Option<DetectorState> {
        self.label
    }

    #[must_use]
    pub const fn scheduler(&self) -> &PlaybackScheduler<O> {
        &self.scheduler
    }

    pub const fn scheduler_mut(&mut self) -> &mut PlaybackScheduler<O> {
        &mut self.scheduler
    }
}
