//! Murmur - voice assistant client
//!
//! Listens on the microphone, transcribes each utterance, streams a reply
//! from the generation service and speaks it sentence by sentence while the
//! reply is still being generated.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   VadEvent    ┌───────────────────┐   Transcribed
//! │  MicVad      ├──────────────►│                   │◄──────────────  HttpTranscriber
//! └──────────────┘               │  event queue      │
//!                                │  (single order)   │◄──────────────  WsConnector tasks
//!                                └─────────┬─────────┘   Channel events
//!                                          │
//!                                ┌─────────▼─────────┐
//!                                │ UtteranceLifecycle│
//!                                └─────────┬─────────┘
//!                                          │
//!              ChatStreamConsumer ──► SentenceSegmenter ──► SynthesisChannel
//!                                                                 │
//!                                 PlaybackScheduler ◄── PcmFrameDecoder
//! ```

pub mod channels;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod presenter;
pub mod voice;

pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use events::{Event, UtteranceId};
pub use lifecycle::{ChatSettings, LifecycleState, UtteranceLifecycle};
pub use presenter::{ConsolePresenter, DetectorState, FAILURE_TEXT, Presenter, TranscriptLog};
