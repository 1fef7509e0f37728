//! In-Memory Connection Registry
//!
//! Tracks live subscriber connections and their outbound queues. The
//! registry is also the push transport: a push places the payload on the
//! connection's bounded queue, and the connection's WebSocket task drains
//! it.
//!
//! # Push classification
//!
//! | Situation                       | Outcome     |
//! |---------------------------------|-------------|
//! | queue accepted the message      | `Delivered` |
//! | queue full                      | `Transient` |
//! | queue closed (socket task gone) | `Gone`      |
//! | unknown or expired connection   | `Gone`      |

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::ports::{
    ConnectionId, ConnectionRegistry, PushOutcome, RegistryError, SubscriberTransport,
};
use crate::infrastructure::metrics;

/// Receiving half of a connection's outbound queue.
pub type OutboundReceiver = mpsc::Receiver<Arc<str>>;

#[derive(Debug)]
struct ConnectionEntry {
    sender: mpsc::Sender<Arc<str>>,
    connected_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl ConnectionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Registration details returned by [`InMemoryConnectionRegistry::connect`].
#[derive(Debug)]
pub struct Registration {
    /// Assigned connection id.
    pub id: ConnectionId,
    /// Time of registration.
    pub connected_at: DateTime<Utc>,
    /// Queue the connection's socket task should drain.
    pub receiver: OutboundReceiver,
}

/// Connection registry held in process memory.
#[derive(Debug)]
pub struct InMemoryConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    queue_capacity: usize,
    ttl: chrono::Duration,
}

impl InMemoryConnectionRegistry {
    /// Create an empty registry.
    ///
    /// `queue_capacity` bounds each connection's outbound queue; `ttl` is
    /// how long a registration stays listable.
    #[must_use]
    pub fn new(queue_capacity: usize, ttl: Duration) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Register a new connection under a fresh UUID.
    pub fn connect(&self) -> Registration {
        self.connect_with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Register a connection under `id`, replacing any previous entry.
    pub fn connect_with_id(&self, id: impl Into<ConnectionId>) -> Registration {
        let id = id.into();
        let (sender, receiver) = mpsc::channel(self.queue_capacity);
        let connected_at = Utc::now();
        let expires_at = connected_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let count = {
            let mut connections = self.connections.write();
            connections.insert(
                id.clone(),
                ConnectionEntry {
                    sender,
                    connected_at,
                    expires_at,
                },
            );
            connections.len()
        };
        metrics::set_active_connections(count);
        tracing::info!(connection_id = %id, "Subscriber connected");

        Registration {
            id,
            connected_at,
            receiver,
        }
    }

    /// Remove a connection. Removing an absent id is a no-op.
    ///
    /// Returns `true` if an entry was removed.
    pub fn disconnect(&self, id: &str) -> bool {
        let (removed, count) = {
            let mut connections = self.connections.write();
            let removed = connections.remove(id).is_some();
            (removed, connections.len())
        };
        if removed {
            metrics::set_active_connections(count);
            tracing::info!(connection_id = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Number of registered connections, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// When `id` was registered, if it still is.
    #[must_use]
    pub fn connected_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.connections.read().get(id).map(|e| e.connected_at)
    }

    /// Drop every expired registration; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let (purged, count) = {
            let mut connections = self.connections.write();
            let before = connections.len();
            connections.retain(|_, entry| !entry.is_expired(now));
            (before - connections.len(), connections.len())
        };
        if purged > 0 {
            metrics::set_active_connections(count);
            tracing::debug!(purged, "Purged expired connections");
        }
        purged
    }

    fn list_at(&self, now: DateTime<Utc>) -> Vec<ConnectionId> {
        self.connections
            .read()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn push_at(&self, id: &str, payload: Arc<str>, now: DateTime<Utc>) -> PushOutcome {
        let sender = {
            let connections = self.connections.read();
            match connections.get(id) {
                Some(entry) if !entry.is_expired(now) => entry.sender.clone(),
                _ => return PushOutcome::Gone,
            }
        };

        match sender.try_send(payload) {
            Ok(()) => PushOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                PushOutcome::Transient("outbound queue full".to_string())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Gone,
        }
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn list(&self) -> Result<Vec<ConnectionId>, RegistryError> {
        Ok(self.list_at(Utc::now()))
    }

    async fn evict(&self, id: &str) -> Result<(), RegistryError> {
        self.disconnect(id);
        Ok(())
    }
}

#[async_trait]
impl SubscriberTransport for InMemoryConnectionRegistry {
    async fn push(&self, id: &str, payload: Arc<str>) -> PushOutcome {
        self.push_at(id, payload, Utc::now())
    }
}
