//! Shared test utilities
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use murmur::channels::{ChannelEvent, ChannelKind, ChannelLink, Connector, Frame, Outbound};
use murmur::events::{EventReceiver, EventSender, event_queue};
use murmur::voice::{AudioOutput, PlaybackScheduler, SYNTHESIS_SAMPLE_RATE, Transcriber, Transcription};
use murmur::{
    ChatSettings, DetectorState, Error, Event, Presenter, Result, TranscriptLog, UtteranceId,
    UtteranceLifecycle,
};

/// Audio output whose clock only moves when the test says so
#[derive(Debug, Default)]
pub struct ManualOutput {
    pub now: f64,
    pub started: Vec<(f64, usize)>,
    pub clears: usize,
}

impl AudioOutput for ManualOutput {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn sample_rate(&self) -> u32 {
        SYNTHESIS_SAMPLE_RATE
    }

    fn start_at(&mut self, samples: Vec<f32>, start: f64) {
        self.started.push((start, samples.len()));
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

struct Wire {
    kind: ChannelKind,
    utterance: UtteranceId,
    rx: mpsc::UnboundedReceiver<Outbound>,
    log: Vec<Outbound>,
}

/// Connector that records every channel opened and everything written to it
#[derive(Clone, Default)]
pub struct RecordingConnector {
    wires: Rc<RefCell<Vec<Wire>>>,
}

impl Connector for RecordingConnector {
    fn connect(&self, kind: ChannelKind, utterance: UtteranceId, _events: EventSender) -> ChannelLink {
        let (link, rx) = ChannelLink::new(kind, utterance);
        self.wires.borrow_mut().push(Wire {
            kind,
            utterance,
            rx,
            log: Vec::new(),
        });
        link
    }
}

impl RecordingConnector {
    /// Channels opened so far, in order
    pub fn opened(&self) -> Vec<(ChannelKind, UtteranceId)> {
        self.wires
            .borrow()
            .iter()
            .map(|w| (w.kind, w.utterance))
            .collect()
    }

    /// Everything written to a channel so far
    pub fn sent(&self, kind: ChannelKind, utterance: UtteranceId) -> Vec<Outbound> {
        let mut wires = self.wires.borrow_mut();
        let Some(wire) = wires
            .iter_mut()
            .find(|w| w.kind == kind && w.utterance == utterance)
        else {
            return Vec::new();
        };
        while let Ok(message) = wire.rx.try_recv() {
            wire.log.push(message);
        }
        wire.log.clone()
    }

    /// Text written to a channel, ignoring close requests
    pub fn sent_text(&self, kind: ChannelKind, utterance: UtteranceId) -> Vec<String> {
        self.sent(kind, utterance)
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Text(text) => Some(text),
                Outbound::Close => None,
            })
            .collect()
    }

    /// Whether the owner asked for a channel to be closed
    pub fn closed(&self, kind: ChannelKind, utterance: UtteranceId) -> bool {
        self.sent(kind, utterance).contains(&Outbound::Close)
    }
}

/// Transcriber answering from a script
#[derive(Clone, Default)]
pub struct ScriptedTranscriber {
    script: Arc<Mutex<VecDeque<Result<Transcription>>>>,
    received: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedTranscriber {
    pub fn push_text(&self, text: &str) {
        self.push(Ok(Transcription {
            text: text.to_string(),
        }));
    }

    pub fn push_error(&self) {
        self.push(Err(Error::Transcription("service status error".to_string())));
    }

    fn push(&self, result: Result<Transcription>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Sample counts of every request
    pub fn received(&self) -> Vec<usize> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, samples: Vec<f32>) -> Result<Transcription> {
        self.received.lock().unwrap().push(samples.len());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transcription("script exhausted".to_string())))
    }
}

/// Presenter call, in the order made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Add(String),
    Update(String),
    State(DetectorState),
}

/// Presenter that records every call and keeps a transcript log
#[derive(Clone)]
pub struct RecordingPresenter {
    calls: Rc<RefCell<Vec<Shown>>>,
    log: Rc<RefCell<TranscriptLog>>,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self {
            calls: Rc::default(),
            log: Rc::new(RefCell::new(TranscriptLog::new(6))),
        }
    }
}

impl Presenter for RecordingPresenter {
    fn add_transcript_entry(&mut self, text: &str) {
        self.calls.borrow_mut().push(Shown::Add(text.to_string()));
        self.log.borrow_mut().add(text);
    }

    fn update_transcript_entry(&mut self, text: &str) {
        self.calls.borrow_mut().push(Shown::Update(text.to_string()));
        self.log.borrow_mut().update(text);
    }

    fn set_detector_state(&mut self, state: DetectorState) {
        self.calls.borrow_mut().push(Shown::State(state));
    }
}

impl RecordingPresenter {
    pub fn calls(&self) -> Vec<Shown> {
        self.calls.borrow().clone()
    }

    /// Detector labels shown so far
    pub fn labels(&self) -> Vec<DetectorState> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Shown::State(s) => Some(*s),
                _ => None,
            })
            .collect()
    }

    pub fn last_label(&self) -> Option<DetectorState> {
        self.labels().last().copied()
    }

    /// Transcript entries, newest first
    pub fn entries(&self) -> Vec<String> {
        self.log.borrow().entries().map(ToString::to_string).collect()
    }
}

/// A lifecycle wired to fake collaborators
pub struct Harness {
    pub lifecycle: UtteranceLifecycle<ManualOutput>,
    pub connector: RecordingConnector,
    pub transcriber: ScriptedTranscriber,
    pub presenter: RecordingPresenter,
    pub tx: EventSender,
    pub rx: EventReceiver,
}

impl Harness {
    pub fn new() -> Self {
        let (tx, rx) = event_queue();
        let connector = RecordingConnector::default();
        let transcriber = ScriptedTranscriber::default();
        let presenter = RecordingPresenter::default();

        let lifecycle = UtteranceLifecycle::new(
            PlaybackScheduler::new(ManualOutput::default()).unwrap(),
            Box::new(connector.clone()),
            Arc::new(transcriber.clone()),
            Box::new(presenter.clone()),
            tx.clone(),
            ChatSettings {
                model: "chatgpt".to_string(),
                prompt: "Be brief.".to_string(),
            },
        );

        Self {
            lifecycle,
            connector,
            transcriber,
            presenter,
            tx,
            rx,
        }
    }

    /// Wait for the next queued event and hand it to the lifecycle
    pub async fn pump(&mut self) {
        let event = next_event(&mut self.rx).await;
        self.lifecycle.handle(event);
    }

    /// Speak one utterance and let its transcription come back
    pub async fn utterance(&mut self, samples: usize) -> UtteranceId {
        self.lifecycle.on_speech_start();
        self.lifecycle.on_speech_end(vec![0.1; samples]);
        let id = self
            .lifecycle
            .active_utterance()
            .expect("speech end allocates an utterance");
        self.pump().await;
        id
    }

    pub fn channel(&mut self, id: UtteranceId, kind: ChannelKind, event: ChannelEvent) {
        self.lifecycle.handle(Event::Channel {
            utterance: id,
            kind,
            event,
        });
    }

    pub fn fragment(&mut self, id: UtteranceId, text: &str) {
        self.channel(
            id,
            ChannelKind::Generation,
            ChannelEvent::Frame(Frame::Text(text.to_string())),
        );
    }

    pub fn audio(&mut self, id: UtteranceId, samples: usize) {
        self.channel(
            id,
            ChannelKind::Synthesis,
            ChannelEvent::Frame(Frame::Binary(pcm_frame(samples))),
        );
    }

    pub fn set_clock(&mut self, now: f64) {
        self.lifecycle.scheduler_mut().output_mut().now = now;
    }

    pub fn output(&self) -> &ManualOutput {
        self.lifecycle.scheduler().output()
    }
}

/// Receive the next event or fail the test
pub async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event queue closed")
}

/// A binary synthesis frame of `samples` quiet 16-bit samples
pub fn pcm_frame(samples: usize) -> Vec<u8> {
    (0..samples).flat_map(|_| 1000i16.to_le_bytes()).collect()
}

/// Generate sine wave audio samples at `rate`
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sine(frequency: f32, duration_secs: f32, amplitude: f32, rate: u32) -> Vec<f32> {
    let count = (rate as f32 * duration_secs) as usize;
    (0..count)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
