// Document Session Management
//
// This module tracks which connections are joined to which document and owns
// one broadcast group per document.

use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// A shout on its way to the other members of a document
#[derive(Debug, Clone)]
pub struct RelayedShout {
    /// Connection that sent it; never delivered back to it
    pub from: String,
    pub payload: JsonValue,
}

struct DocumentSession {
    tx: broadcast::Sender<RelayedShout>,
    /// Connection ids joined to the document
    members: HashSet<String>,
}

/// Document registry
pub struct DocumentRegistry {
    documents: Arc<RwLock<HashMap<String, DocumentSession>>>,
    capacity: usize,
}

impl DocumentRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Join `connection_id` to `doc`, creating the document group on first
    /// join. Returns the receiver for the document's shouts and the member count.
    pub async fn join(
        &self,
        doc: &str,
        connection_id: &str,
    ) -> (broadcast::Receiver<RelayedShout>, usize) {
        let mut documents = self.documents.write().await;
        let session = documents.entry(doc.to_string()).or_insert_with(|| {
            tracing::debug!("Opening document {}", doc);
            DocumentSession {
                tx: broadcast::channel(self.capacity).0,
                members: HashSet::new(),
            }
        });
        session.members.insert(connection_id.to_string());
        (session.tx.subscribe(), session.members.len())
    }

    /// Remove `connection_id` from `doc`; the document is dropped with its
    /// last member.
    pub async fn leave(&self, doc: &str, connection_id: &str) -> bool {
        let mut documents = self.documents.write().await;
        let Some(session) = documents.get_mut(doc) else {
            return false;
        };
        let removed = session.members.remove(connection_id);
        if session.members.is_empty() {
            documents.remove(doc);
            tracing::debug!("Closing document {}", doc);
        }
        removed
    }

    /// Broadcast a shout to `doc`. Returns the number of receivers it reached,
    /// the sender's own subscription included.
    pub async fn publish(&self, doc: &str, shout: RelayedShout) -> usize {
        let documents = self.documents.read().await;
        match documents.get(doc) {
            Some(session) => session.tx.send(shout).unwrap_or(0),
            None => 0,
        }
    }

    pub async fn member_count(&self, doc: &str) -> usize {
        let documents = self.documents.read().await;
        documents.get(doc).map_or(0, |session| session.members.len())
    }

    pub async fn document_count(&self) -> usize {
        let documents = self.documents.read().await;
        documents.len()
    }
}

impl Default for DocumentRegistry {
    fn default() -> Self {
        Self::new(coedit_core::config::DEFAULT_CHANNEL_CAPACITY)
    }
}
