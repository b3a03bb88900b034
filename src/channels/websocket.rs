//! WebSocket connector

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::{ChannelEvent, ChannelKind, ChannelLink, Connector, Frame, Outbound};
use crate::config::ServicesConfig;
use crate::events::{Event, EventSender, UtteranceId};

/// Opens channels as WebSocket connections, one task per channel
#[derive(Debug, Clone)]
pub struct WsConnector {
    chat_url: String,
    speech_url: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(chat_url: impl Into<String>, speech_url: impl Into<String>) -> Self {
        Self {
            chat_url: chat_url.into(),
            speech_url: speech_url.into(),
        }
    }

    #[must_use]
    pub fn from_services(services: &ServicesConfig) -> Self {
        Self::new(&services.chat_url, &services.speech_url)
    }

    fn url(&self, kind: ChannelKind) -> &str {
        match kind {
            ChannelKind::Generation => &self.chat_url,
            ChannelKind::Synthesis => &self.speech_url,
        }
    }
}

impl Connector for WsConnector {
    fn connect(&self, kind: ChannelKind, utterance: UtteranceId, events: EventSender) -> ChannelLink {
        let (link, outbound) = ChannelLink::new(kind, utterance);
        let url = self.url(kind).to_string();

        tokio::spawn(async move {
            let reporter = Reporter {
                kind,
                utterance,
                events,
            };
            run_channel(&url, outbound, &reporter).await;
        });

        link
    }
}

struct Reporter {
    kind: ChannelKind,
    utterance: UtteranceId,
    events: EventSender,
}

impl Reporter {
    fn report(&self, event: ChannelEvent) {
        let _ = self.events.send(Event::Channel {
            utterance: self.utterance,
            kind: self.kind,
            event,
        });
    }
}

async fn run_channel(url: &str, mut outbound: mpsc::UnboundedReceiver<Outbound>, reporter: &Reporter) {
    let stream = match connect_async(url).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            tracing::warn!(kind = %reporter.kind, url, error = %e, "channel connect failed");
            reporter.report(ChannelEvent::Failed(e.to_string()));
            return;
        }
    };

    tracing::debug!(kind = %reporter.kind, utterance = %reporter.utterance, "channel open");
    reporter.report(ChannelEvent::Opened);

    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        tracing::warn!(kind = %reporter.kind, error = %e, "channel send failed");
                        reporter.report(ChannelEvent::Failed(e.to_string()));
                        return;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.close().await;
                    tracing::debug!(kind = %reporter.kind, utterance = %reporter.utterance, "channel closed locally");
                    reporter.report(ChannelEvent::Closed);
                    return;
                }
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    reporter.report(ChannelEvent::Frame(Frame::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    reporter.report(ChannelEvent::Frame(Frame::Binary(data.to_vec())));
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(kind = %reporter.kind, utterance = %reporter.utterance, "channel closed by remote");
                    reporter.report(ChannelEvent::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(kind = %reporter.kind, error = %e, "channel receive failed");
                    reporter.report(ChannelEvent::Failed(e.to_string()));
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_queue;

    #[test]
    fn test_url_per_kind() {
        let connector = WsConnector::new("ws://chat", "ws://speak");
        assert_eq!(connector.url(ChannelKind::Generation), "ws://chat");
        assert_eq!(connector.url(ChannelKind::Synthesis), "ws://speak");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_failure() {
        let connector = WsConnector::new("ws://127.0.0.1:1/chat", "ws://127.0.0.1:1/speak");
        let (tx, mut rx) = event_queue();

        let _link = connector.connect(ChannelKind::Generation, UtteranceId::new(4), tx);

        let Some(Event::Channel {
            utterance,
            kind,
            event,
        }) = rx.recv().await
        else {
            panic!("expected a channel event");
        };
        assert_eq!(utterance, UtteranceId::new(4));
        assert_eq!(kind, ChannelKind::Generation);
        assert!(matches!(event, ChannelEvent::Failed(_)));
    }
}
