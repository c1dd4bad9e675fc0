// Shout Channel Interface
//
// The broadcast half of a document connection. Implementations deliver a
// message to every other client of the same document, best effort.

use super::protocol::ShoutMessage;
use crate::error::ShoutError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

#[async_trait]
pub trait ShoutChannel: Send + Sync {
    /// Broadcast `message` to all other clients sharing the document
    async fn shout(&self, message: ShoutMessage) -> Result<(), ShoutError>;
}

#[async_trait]
impl ShoutChannel for mpsc::UnboundedSender<ShoutMessage> {
    async fn shout(&self, message: ShoutMessage) -> Result<(), ShoutError> {
        self.send(message).map_err(|_| ShoutError::Closed)
    }
}

#[async_trait]
impl<T: ShoutChannel + ?Sized> ShoutChannel for Arc<T> {
    async fn shout(&self, message: ShoutMessage) -> Result<(), ShoutError> {
        (**self).shout(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_sender_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.shout(ShoutMessage::ping("u1")).await.unwrap();
        assert_eq!(rx.recv().await, Some(ShoutMessage::ping("u1")));
    }

    #[tokio::test]
    async fn test_unbounded_sender_closed() {
        let (tx, rx) = mpsc::unbounded_channel::<ShoutMessage>();
        drop(rx);
        let err = tx.shout(ShoutMessage::close("u1")).await.unwrap_err();
        assert!(matches!(err, ShoutError::Closed));
    }
}
