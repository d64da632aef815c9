use std::sync::Arc;

use uuid::Uuid;

use crate::config::MAX_MESSAGE_LEN;
use crate::error::{AppError, AppResult};
use crate::message::{Message, ServerMessage};
use crate::metrics;
use crate::registry::ConnectionRegistry;
use crate::store::MessageStore;

/// Persists a sent message, then pushes it to every live connection of both
/// parties. The only component that touches both the registry and the store.
///
/// Durability is guaranteed solely by the store write; the push is
/// fire-and-forget against currently-registered connections. A recipient who
/// is offline at send time fetches history over REST on next connect.
pub struct DeliveryCoordinator {
    store: Arc<dyn MessageStore>,
    registry: Arc<ConnectionRegistry>,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<dyn MessageStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Handle a send request. Returns the persisted message so the caller's
    /// synchronizer can reconcile its optimistic entry against the real id.
    pub async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: &str,
        text: &str,
    ) -> AppResult<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::invalid_request("message text must not be empty"));
        }
        if text.len() > MAX_MESSAGE_LEN {
            return Err(AppError::invalid_request(format!(
                "message text exceeds maximum of {} bytes",
                MAX_MESSAGE_LEN
            )));
        }
        let receiver_id = Uuid::parse_str(receiver_id)
            .map_err(|_| AppError::invalid_request("invalid receiver id"))?;
        if receiver_id == sender_id {
            return Err(AppError::invalid_request("cannot send a message to yourself"));
        }

        let message = match self.store.append(sender_id, receiver_id, text).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, sender_id = %sender_id, "message persistence failed");
                return Err(AppError::delivery_failed("message could not be persisted"));
            }
        };
        metrics::MESSAGES_SENT_TOTAL.inc();

        // Registry lookups happen only after persistence completes; no lock
        // is held across the store write. Sender fan-out keeps the sender's
        // other tabs consistent.
        self.push_to(receiver_id, &message).await;
        self.push_to(sender_id, &message).await;

        Ok(message)
    }

    async fn push_to(&self, identity: Uuid, message: &Message) {
        for sender in self.registry.lookup(identity).await {
            if sender
                .send(ServerMessage::Delivered {
                    message: message.clone(),
                })
                .is_err()
            {
                // Connection closed between lookup and push: drop this one
                // fan-out target, never fail the send.
                metrics::PUSHES_DROPPED_TOTAL.inc();
                tracing::debug!(
                    identity = %identity,
                    message_id = message.id,
                    "push to closed connection dropped"
                );
            }
        }
    }
}
