use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::message::Message;

/// Durable, append-only persistence of messages.
///
/// `append` assigns `id` and `created_at` and never partially persists: a
/// returned `Message` is guaranteed durable. `list_conversation` is a
/// side-effect-free read covering both directions of the pair, ordered by
/// `(created_at, id)`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, sender_id: Uuid, receiver_id: Uuid, text: &str) -> AppResult<Message>;

    async fn list_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> AppResult<()>;
}

/// Postgres-backed store. Message ids come from a BIGSERIAL sequence, so they
/// are globally unique and monotonic.
pub struct PgMessageStore {
    pool: Arc<DbPool>,
}

impl PgMessageStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, sender_id: Uuid, receiver_id: Uuid, text: &str) -> AppResult<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (sender_id, receiver_id, text)
            VALUES ($1, $2, $3)
            RETURNING id, sender_id, receiver_id, text, created_at
            "#,
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(text)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "message insert failed");
            AppError::store_unavailable(e.to_string())
        })
    }

    async fn list_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT id, sender_id, receiver_id, text, created_at
            FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            ORDER BY created_at, id
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "conversation query failed");
            AppError::store_unavailable(e.to_string())
        })
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| AppError::store_unavailable(e.to_string()))?;
        Ok(())
    }
}

/// In-memory store for tests and local development. Supports simulating a
/// persistence outage via [`MemoryStore::set_unavailable`].
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicI64,
    messages: RwLock<Vec<Message>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable("storage backend unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, sender_id: Uuid, receiver_id: Uuid, text: &str) -> AppResult<Message> {
        self.check_available()?;
        let message = Message {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            sender_id,
            receiver_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn list_conversation(&self, a: Uuid, b: Uuid) -> AppResult<Vec<Message>> {
        self.check_available()?;
        let messages = self.messages.read().await;
        let mut conversation: Vec<Message> = messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b)
                    || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        conversation.sort_by_key(Message::sort_key);
        Ok(conversation)
    }

    async fn ping(&self) -> AppResult<()> {
        self.check_available()
    }
}
