//! In-process message router
//!
//! Each party registers a mailbox under its address; the router task
//! forwards every message to its receiver's mailbox. Messages to
//! unregistered addresses are dropped with a warning. Correlation
//! filtering (conversation id, in-reply-to) is the session's job, not
//! the router's.

use crate::error::{Result, TenderMeshError};
use crate::protocol::Message;
use crate::types::PartyId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const MAILBOX_CAPACITY: usize = 64;

/// Cloneable sending half of the router
#[derive(Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Message>,
}

impl MessageSender {
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|e| TenderMeshError::MessageRouting(format!("router closed: {}", e)))
    }
}

/// Handle for registering mailboxes and sending messages
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<Message>,
    registry: Arc<Mutex<HashMap<PartyId, mpsc::Sender<Message>>>>,
}

impl RouterHandle {
    /// Register a mailbox for `party`, replacing any previous one.
    pub async fn register(&self, party: PartyId) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let previous = self.registry.lock().await.insert(party.clone(), tx);
        if previous.is_some() {
            tracing::debug!("Replaced existing mailbox for {}", party);
        }
        rx
    }

    pub async fn unregister(&self, party: &PartyId) {
        self.registry.lock().await.remove(party);
    }

    pub fn sender(&self) -> MessageSender {
        MessageSender {
            tx: self.tx.clone(),
        }
    }
}

/// The router task and its handle
pub struct MessageRouter;

impl MessageRouter {
    /// Spawn the routing task; returns the handle used by every party.
    pub fn spawn() -> RouterHandle {
        let (tx, mut rx) = mpsc::channel::<Message>(MAILBOX_CAPACITY * 4);
        let registry: Arc<Mutex<HashMap<PartyId, mpsc::Sender<Message>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let route_registry = registry.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let target = {
                    let reg = route_registry.lock().await;
                    reg.get(&msg.receiver).cloned()
                };
                match target {
                    Some(mailbox) => {
                        if mailbox.send(msg.clone()).await.is_err() {
                            tracing::debug!(
                                "Mailbox for {} is gone, dropping message from {}",
                                msg.receiver,
                                msg.sender
                            );
                            route_registry.lock().await.remove(&msg.receiver);
                        }
                    }
                    None => {
                        tracing::warn!(
                            "No mailbox registered for {}, dropping {:?} from {}",
                            msg.receiver,
                            msg.performative,
                            msg.sender
                        );
                    }
                }
            }
            tracing::debug!("Message router stopped");
        });

        RouterHandle { tx, registry }
    }
}
