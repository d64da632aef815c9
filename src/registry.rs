use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::message::ServerMessage;

/// Maps an identity to its currently-open live connections.
///
/// The registry owns its own synchronization; callers never see the lock.
/// Operations are safe under concurrent register/unregister/lookup from
/// independent connection tasks, and the lock is held only for map mutation,
/// never across I/O. A connection id is registered under exactly one identity
/// for its whole lifetime (the handler that created it is the only caller).
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<ServerMessage>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the set for `identity`. Idempotent with respect to
    /// re-registration of the same connection id.
    pub async fn register(
        &self,
        identity: Uuid,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let mut map = self.inner.write().await;
        map.entry(identity).or_default().insert(connection_id, sender);
    }

    /// Remove a connection. A no-op when the connection is already gone, so
    /// disconnect races never error.
    pub async fn unregister(&self, identity: Uuid, connection_id: Uuid) {
        let mut map = self.inner.write().await;
        if let Some(connections) = map.get_mut(&identity) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                map.remove(&identity);
            }
        }
    }

    /// The live push endpoints for `identity` at call time. May be empty, and
    /// any returned sender may close concurrently; pushing to a closed sender
    /// is the caller's soft failure to drop.
    pub async fn lookup(&self, identity: Uuid) -> Vec<mpsc::UnboundedSender<ServerMessage>> {
        let map = self.inner.read().await;
        map.get(&identity)
            .map(|connections| connections.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self, identity: Uuid) -> usize {
        let map = self.inner.read().await;
        map.get(&identity).map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn channel() -> mpsc::UnboundedSender<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        // keep the receiver alive for the duration of the test
        std::mem::forget(rx);
        tx
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();

        assert!(registry.lookup(user).await.is_empty());

        registry.register(user, Uuid::new_v4(), channel()).await;
        registry.register(user, Uuid::new_v4(), channel()).await;
        assert_eq!(registry.lookup(user).await.len(), 2);
        assert_eq!(registry.connection_count(user).await, 2);
    }

    #[tokio::test]
    async fn duplicate_registration_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn = Uuid::new_v4();

        registry.register(user, conn, channel()).await;
        registry.register(user, conn, channel()).await;
        assert_eq!(registry.connection_count(user).await, 1);
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_scoped() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let conn_a = Uuid::new_v4();
        let conn_b = Uuid::new_v4();

        registry.register(user, conn_a, channel()).await;
        registry.register(user, conn_b, channel()).await;

        registry.unregister(user, conn_a).await;
        registry.unregister(user, conn_a).await; // already removed: no-op
        assert_eq!(registry.connection_count(user).await, 1);

        registry.unregister(user, conn_b).await;
        assert!(registry.lookup(user).await.is_empty());

        // unknown identity is also a no-op
        registry.unregister(Uuid::new_v4(), Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn concurrent_lifecycle_events() {
        let registry = Arc::new(ConnectionRegistry::new());
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let conn = Uuid::new_v4();
                registry.register(user, conn, channel()).await;
                let _ = registry.lookup(user).await;
                registry.unregister(user, conn).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.connection_count(user).await, 0);
    }
}
