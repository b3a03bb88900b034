//! Streaming channels to the generation and synthesis services
//!
//! A channel is opened per utterance through a [`Connector`]. The connector
//! reports everything that happens on the connection back into the event
//! queue tagged with the utterance and channel kind; the owner writes to it
//! through a [`ChannelLink`].

mod outbound;
mod websocket;

use std::fmt;

use tokio::sync::mpsc;

pub use outbound::OutboundQueue;
pub use websocket::WsConnector;

use crate::events::{EventSender, UtteranceId};

/// Which service a channel talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Streams reply text fragments
    Generation,
    /// Turns text chunks into PCM audio
    Synthesis,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generation => write!(f, "generation"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// Inbound message on a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Connection state change or inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection established; queued messages may be sent
    Opened,
    /// Inbound message, in arrival order
    Frame(Frame),
    /// Remote side closed the connection
    Closed,
    /// Connection could not be opened or broke
    Failed(String),
}

/// Outbound instruction for a channel task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Write half of a channel, owned by the component using the channel
///
/// Writes after the connection has gone away are dropped.
#[derive(Debug)]
pub struct ChannelLink {
    kind: ChannelKind,
    utterance: UtteranceId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelLink {
    /// Create a link and the receiver its connection task reads from
    #[must_use]
    pub fn new(
        kind: ChannelKind,
        utterance: UtteranceId,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                kind,
                utterance,
                tx,
            },
            rx,
        )
    }

    /// Send a text message
    pub fn send_text(&self, text: String) {
        self.send(Outbound::Text(text));
    }

    /// Ask the connection task to close the channel
    pub fn close(&self) {
        self.send(Outbound::Close);
    }

    fn send(&self, message: Outbound) {
        if self.tx.send(message).is_err() {
            tracing::trace!(
                kind = %self.kind,
                utterance = %self.utterance,
                "channel gone, outbound message dropped"
            );
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        self.utterance
    }
}

/// Opens streaming channels
pub trait Connector {
    /// Start connecting a channel for `utterance`
    ///
    /// Returns immediately; the connection reports `Opened`, frames, and
    /// `Closed` or `Failed` through `events`.
    fn connect(&self, kind: ChannelKind, utterance: UtteranceId, events: EventSender) -> ChannelLink;
}
