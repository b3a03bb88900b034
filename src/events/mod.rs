//! The single event queue feeding the utterance lifecycle
//!
//! Every asynchronous source (detector, transcription, both streaming
//! channels) pushes into one unbounded queue, so the lifecycle sees all of
//! them in one total order.

use std::fmt;

use tokio::sync::mpsc;

use crate::Result;
use crate::channels::{ChannelEvent, ChannelKind};
use crate::voice::{Transcription, VadEvent};

/// Identity of one utterance, increasing with every new utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtteranceId(u64);

impl UtteranceId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Anything the lifecycle reacts to
#[derive(Debug)]
pub enum Event {
    /// Boundary reported by the voice activity detector
    Vad(VadEvent),

    /// Transcription finished for an utterance
    Transcribed {
        utterance: UtteranceId,
        result: Result<Transcription>,
    },

    /// Something happened on one of an utterance's streaming channels
    Channel {
        utterance: UtteranceId,
        kind: ChannelKind,
        event: ChannelEvent,
    },

    /// Stop the client
    Shutdown,
}

impl Event {
    /// Utterance this event belongs to, if it is utterance-scoped
    #[must_use]
    pub const fn utterance(&self) -> Option<UtteranceId> {
        match self {
            Self::Transcribed { utterance, .. } | Self::Channel { utterance, .. } => {
                Some(*utterance)
            }
            Self::Vad(_) | Self::Shutdown => None,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the event queue
#[must_use]
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
