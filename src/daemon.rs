//! Daemon - the voice assistant client
//!
//! Wires the microphone detector, transcription, streaming channels and
//! speaker output around one event queue and runs the lifecycle over it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::channels::{ChannelEvent, ChannelKind, WsConnector};
use crate::chat::SentenceSegmenter;
use crate::events::{Event, EventReceiver, EventSender, UtteranceId, event_queue};
use crate::lifecycle::{ChatSettings, UtteranceLifecycle};
use crate::presenter::ConsolePresenter;
use crate::voice::{
    AudioOutput, DeviceOutput, HttpTranscriber, MicVad, PlaybackScheduler, SynthesisChannel,
    VoiceActivityDetector,
};
use crate::{Config, Error, Result};

/// How often the detector is polled for new boundaries
const VAD_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The murmur daemon - listens, answers, and speaks
pub struct Daemon {
    config: Config,
}

impl Daemon {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the assistant until Ctrl-C
    ///
    /// Must run on a current-thread runtime; audio streams are not `Send`.
    ///
    /// # Errors
    ///
    /// Returns error if the audio devices or service clients cannot be set up
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let services = &self.config.services;
        let (tx, rx) = event_queue();

        let scheduler = PlaybackScheduler::new(DeviceOutput::open()?)?;
        let transcriber = Arc::new(HttpTranscriber::new(
            &services.transcription_url,
            services.request_timeout,
        )?);
        let connector = Box::new(WsConnector::from_services(services));
        let presenter = Box::new(ConsolePresenter::new(self.config.transcript_capacity));

        let mut lifecycle = UtteranceLifecycle::new(
            scheduler,
            connector,
            transcriber,
            presenter,
            tx.clone(),
            ChatSettings::from_config(&self.config),
        );

        tracing::info!(
            assistant = %self.config.assistant.name,
            transcription = %services.transcription_url,
            chat = %services.chat_url,
            speech = %services.speech_url,
            "murmur starting"
        );

        let mut vad = MicVad::new(self.config.vad);
        vad.start()?;

        run_event_loop(&mut lifecycle, &mut vad, &tx, rx).await;

        vad.destroy();
        Ok(())
    }

    /// Speak `text` through the synthesis service and wait for playback
    ///
    /// # Errors
    ///
    /// Returns error if the speaker cannot be opened or the synthesis
    /// channel fails
    #[allow(clippy::future_not_send)]
    pub async fn say(&self, text: &str) -> Result<()> {
        let (tx, mut rx) = event_queue();
        let connector = WsConnector::from_services(&self.config.services);
        let mut scheduler = PlaybackScheduler::new(DeviceOutput::open()?)?;

        let mut synthesis = SynthesisChannel::open(&connector, UtteranceId::new(1), tx);
        let mut segmenter = SentenceSegmenter::new();
        for chunk in segmenter.feed(text).into_iter().chain(segmenter.flush()) {
            synthesis.enqueue(chunk);
        }
        synthesis.end_of_stream();

        let idle = self.config.services.request_timeout;
        loop {
            let event = tokio::time::timeout(idle, rx.recv())
                .await
                .map_err(|_| Error::Synthesis("no audio before timeout".to_string()))?;

            let Some(Event::Channel {
                kind: ChannelKind::Synthesis,
                event,
                ..
            }) = event
            else {
                break;
            };

            match event {
                ChannelEvent::Opened => synthesis.on_open(),
                ChannelEvent::Frame(frame) => {
                    synthesis.on_frame(frame, &mut scheduler);
                }
                ChannelEvent::Closed => break,
                ChannelEvent::Failed(reason) => return Err(Error::Synthesis(reason)),
            }
        }

        tracing::info!(frames = synthesis.frames_received(), "synthesis finished");
        drain_playback(&scheduler).await;
        Ok(())
    }
}

/// Feed the lifecycle from the event queue until shutdown
///
/// Detector boundaries are pushed into the same queue as every other
/// source, so they are handled in arrival order with channel and
/// transcription events.
#[allow(clippy::future_not_send)]
pub async fn run_event_loop<O: AudioOutput>(
    lifecycle: &mut UtteranceLifecycle<O>,
    vad: &mut dyn VoiceActivityDetector,
    tx: &EventSender,
    mut rx: EventReceiver,
) {
    let mut tick = tokio::time::interval(VAD_POLL_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Event::Shutdown) | None => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(event) => lifecycle.handle(event),
            },
            _ = tick.tick() => {
                for event in vad.poll() {
                    let _ = tx.send(Event::Vad(event));
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    lifecycle.shutdown();
}

/// Wait until everything scheduled on the output has played
#[allow(clippy::future_not_send)]
pub async fn drain_playback<O: AudioOutput>(scheduler: &PlaybackScheduler<O>) {
    let pending = scheduler.pending_duration();
    if pending > 0.0 {
        tracing::debug!(seconds = pending, "waiting for playback");
        tokio::time::sleep(Duration::from_secs_f64(pending) + Duration::from_millis(100)).await;
    }
}
