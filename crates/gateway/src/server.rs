use crate::protocol::*;
use crate::session::{DocumentRegistry, RelayedShout};
use anyhow::{Context, Result};
use coedit_core::RelayConfig;
use futures_util::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;

/// Document the connection is joined to, with its shout subscription
type Joined = Option<(String, broadcast::Receiver<RelayedShout>)>;

/// Shout relay server
pub struct RelayServer {
    config: RelayConfig,
    documents: Arc<DocumentRegistry>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let documents = Arc::new(DocumentRegistry::new(config.channel_capacity));
        Self { config, documents }
    }

    /// Bind the configured address and serve until the task is cancelled
    pub async fn start(self) -> Result<()> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind relay on {}", addr))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!("Relay server listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let documents = self.documents.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr.to_string(), documents).await
                        {
                            tracing::error!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => tracing::warn!("Failed to accept connection: {}", e),
            }
        }
    }
}

// Handle a WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    addr: String,
    documents: Arc<DocumentRegistry>,
) -> Result<()> {
    // Upgrade to WebSocket
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .context("WebSocket handshake failed")?;

    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!("Connection {} established from {}", conn_id, addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split::<Message>();
    let mut joined: Joined = None;

    let result: Result<()> = async {
        loop {
            tokio::select! {
                // Frames from the client
                msg_result = ws_receiver.next() => {
                    match msg_result {
                        Some(Ok(msg)) => {
                            if msg.is_text() {
                                let text = msg.to_text()?;
                                tracing::debug!("Received frame from {}: {}", conn_id, text);

                                if let Some(reply) = handle_frame(text, &conn_id, &mut joined, &documents).await {
                                    ws_sender.send(Message::Text(reply.to_text()?.into())).await?;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                    }
                }

                // Shouts of the other document members
                shout_result = recv_shout(&mut joined) => {
                    match shout_result {
                        Ok(shout) => {
                            if shout.from != conn_id {
                                let frame = RelayFrame::shout(shout.payload);
                                ws_sender.send(Message::Text(frame.to_text()?.into())).await?;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Connection {} lagged, skipped {} shouts", conn_id, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::debug!("Document channel closed for {}", conn_id);
                            joined = None;
                        }
                    }
                }
            }
        }
        Ok(())
    }
    .await;

    // Clean up membership
    if let Some((doc, _)) = joined.take() {
        documents.leave(&doc, &conn_id).await;
        tracing::info!(
            "Connection {} left {} ({} members remaining)",
            conn_id,
            doc,
            documents.member_count(&doc).await
        );
    }
    tracing::info!(
        "Connection {} closed, {} documents open",
        conn_id,
        documents.document_count().await
    );
    result
}

async fn recv_shout(joined: &mut Joined) -> Result<RelayedShout, broadcast::error::RecvError> {
    match joined {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Apply one client frame; returns the frame to send back, if any
async fn handle_frame(
    text: &str,
    conn_id: &str,
    joined: &mut Joined,
    documents: &DocumentRegistry,
) -> Option<RelayFrame> {
    let frame = match serde_json::from_str::<RelayFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(RelayFrame::Error(ProtocolError::new(
                ProtocolError::INVALID_REQUEST,
                format!("Malformed frame: {}", e),
            )))
        }
    };

    match frame {
        RelayFrame::Join(JoinRequest { doc }) => {
            if let Err(error) = validate_document_id(&doc) {
                return Some(RelayFrame::Error(error));
            }
            if let Some((previous, _)) = joined.take() {
                documents.leave(&previous, conn_id).await;
            }
            let (rx, members) = documents.join(&doc, conn_id).await;
            tracing::info!("Connection {} joined {} ({} members)", conn_id, doc, members);
            *joined = Some((doc.clone(), rx));
            Some(RelayFrame::Opened(OpenedEvent {
                doc,
                connection_id: conn_id.to_string(),
                members,
            }))
        }
        RelayFrame::Shout(ShoutFrame { payload }) => match joined {
            Some((doc, _)) => {
                let shout = RelayedShout {
                    from: conn_id.to_string(),
                    payload,
                };
                documents.publish(doc, shout).await;
                None
            }
            None => Some(RelayFrame::Error(ProtocolError::new(
                ProtocolError::NOT_JOINED,
                "Join a document before shouting",
            ))),
        },
        RelayFrame::Leave {} => {
            if let Some((doc, _)) = joined.take() {
                documents.leave(&doc, conn_id).await;
                tracing::info!("Connection {} left {}", conn_id, doc);
            }
            None
        }
        RelayFrame::Opened(_) | RelayFrame::Error(_) => Some(RelayFrame::Error(ProtocolError::new(
            ProtocolError::INVALID_REQUEST,
            "Frame type is not accepted from clients",
        ))),
    }
}
