// Relay Client
//
// Connects to a shout relay, joins one document and exposes the connection
// as the two halves a presence hub consumes: a `ShoutChannel` and a stream of
// document events.

use crate::protocol::RelayFrame;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use coedit_core::{DocEvent, ShoutChannel, ShoutError, ShoutMessage};
use futures::channel::mpsc as event_mpsc;
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Outgoing half of a relay connection
#[derive(Debug, Clone)]
pub struct RelayShout {
    frames: mpsc::UnboundedSender<RelayFrame>,
}

impl RelayShout {
    /// Stop receiving the document's shouts without closing the socket
    pub fn leave_document(&self) -> Result<(), ShoutError> {
        self.frames
            .send(RelayFrame::Leave {})
            .map_err(|_| ShoutError::Closed)
    }
}

#[async_trait]
impl ShoutChannel for RelayShout {
    async fn shout(&self, message: ShoutMessage) -> Result<(), ShoutError> {
        self.frames
            .send(RelayFrame::shout(message.to_value()))
            .map_err(|_| ShoutError::Closed)
    }
}

/// An open relay connection joined to one document
pub struct RelayConnection {
    pub doc: String,
    pub shout: Arc<RelayShout>,
    pub events: event_mpsc::UnboundedReceiver<DocEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl RelayConnection {
    /// Split into the parts a presence hub needs, plus a handle that tears
    /// the socket down when dropped
    pub fn into_parts(
        self,
    ) -> (
        Arc<RelayShout>,
        event_mpsc::UnboundedReceiver<DocEvent>,
        ConnectionGuard,
    ) {
        let guard = ConnectionGuard {
            reader: self.reader,
            writer: self.writer,
        };
        (self.shout, self.events, guard)
    }
}

/// Aborts the socket tasks of a relay connection on drop
pub struct ConnectionGuard {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ConnectionGuard {
    /// Give the writer up to `grace` to flush queued frames, then tear the
    /// connection down. The writer only finishes once every `RelayShout`
    /// clone is dropped.
    pub async fn close(mut self, grace: Duration) {
        if tokio::time::timeout(grace, &mut self.writer).await.is_err() {
            tracing::debug!("Relay writer still busy after {:?}, aborting", grace);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

pub struct RelayClient;

impl RelayClient {
    /// Connect to the relay at `url` and join `doc`
    pub async fn connect(url: &str, doc: &str) -> Result<RelayConnection> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to relay at {}", url))?;
        tracing::info!("Connected to relay at {}", url);

        let (mut ws_sender, mut ws_receiver) = ws_stream.split::<Message>();
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<RelayFrame>();
        let (event_tx, event_rx) = event_mpsc::unbounded::<DocEvent>();

        frame_tx
            .send(RelayFrame::join(doc))
            .map_err(|_| anyhow!("Relay writer closed before join"))?;

        let writer = tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                let text = match frame.to_text() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("Failed to encode relay frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                    tracing::warn!("Relay send failed: {}", e);
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg_result) = ws_receiver.next().await {
                match msg_result {
                    Ok(msg) if msg.is_text() => {
                        let Ok(text) = msg.to_text() else {
                            continue;
                        };
                        match serde_json::from_str::<RelayFrame>(text) {
                            Ok(frame) => {
                                if let Some(event) = frame_to_event(frame) {
                                    if event_tx.unbounded_send(event).is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => tracing::warn!("Ignoring malformed relay frame: {}", e),
                        }
                    }
                    Ok(msg) if msg.is_close() => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Relay connection error: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Relay reader finished");
        });

        Ok(RelayConnection {
            doc: doc.to_string(),
            shout: Arc::new(RelayShout { frames: frame_tx }),
            events: event_rx,
            reader,
            writer,
        })
    }
}

/// Translate a relay frame into the document event a presence hub consumes
pub(crate) fn frame_to_event(frame: RelayFrame) -> Option<DocEvent> {
    match frame {
        RelayFrame::Opened(opened) => {
            tracing::info!(
                "Joined {} as {} ({} members)",
                opened.doc,
                opened.connection_id,
                opened.members
            );
            Some(DocEvent::Open)
        }
        RelayFrame::Shout(shout) => match ShoutMessage::from_value(&shout.payload) {
            Ok(message) => Some(DocEvent::Shout(message)),
            Err(e) => {
                tracing::warn!("Dropping undecodable shout: {}", e);
                None
            }
        },
        RelayFrame::Error(error) => {
            tracing::warn!("Relay error {}: {}", error.code, error.message);
            None
        }
        RelayFrame::Join(_) | RelayFrame::Leave {} => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OpenedEvent, ProtocolError};
    use serde_json::json;

    #[test]
    fn test_opened_becomes_open_event() {
        let frame = RelayFrame::Opened(OpenedEvent {
            doc: "d".to_string(),
            connection_id: "c1".to_string(),
            members: 2,
        });
        assert_eq!(frame_to_event(frame), Some(DocEvent::Open));
    }

    #[test]
    fn test_shout_payload_decoded() {
        let frame = RelayFrame::shout(json!(["focus", "u2", "fields.a.en"]));
        assert_eq!(
            frame_to_event(frame),
            Some(DocEvent::Shout(ShoutMessage::focus("u2", "fields.a.en")))
        );
    }

    #[test]
    fn test_bad_payload_and_errors_dropped() {
        assert_eq!(frame_to_event(RelayFrame::shout(json!({"x": 1}))), None);
        let error = RelayFrame::Error(ProtocolError::new(ProtocolError::NOT_JOINED, "no"));
        assert_eq!(frame_to_event(error), None);
    }

    #[tokio::test]
    async fn test_relay_shout_encodes_tuple() {
        let (frames, mut rx) = mpsc::unbounded_channel();
        let shout = RelayShout { frames };
        shout.shout(ShoutMessage::close("u1")).await.unwrap();
        assert_eq!(rx.recv().await, Some(RelayFrame::shout(json!(["close", "u1"]))));

        drop(rx);
        assert!(matches!(
            shout.shout(ShoutMessage::ping("u1")).await,
            Err(ShoutError::Closed)
        ));
    }
}
