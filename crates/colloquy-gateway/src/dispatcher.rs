use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use colloquy_core::bus::ClusterBus;
use colloquy_types::events::{ClusterEvent, GatewayEvent, UserState};

pub type ConnectionReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Tracks every live connection of this process and delivers events to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    namespace: String,
    bus: Arc<dyn ClusterBus>,
    registry: RwLock<Registry>,
}

struct Connection {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    /// conn_id -> connection
    connections: HashMap<Uuid, Connection>,
    /// user_id -> conn_ids
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    /// room -> conn_ids
    rooms: HashMap<String, HashSet<Uuid>>,
}

impl Dispatcher {
    pub fn new(namespace: impl Into<String>, bus: Arc<dyn ClusterBus>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                namespace: namespace.into(),
                bus,
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Register a new connection for `user_id`. Returns (conn_id, receiver).
    ///
    /// The user's first connection announces them as connected.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, ConnectionReceiver) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let first = {
            let mut registry = self.inner.registry.write().await;
            registry.connections.insert(
                conn_id,
                Connection {
                    user_id,
                    tx,
                    rooms: HashSet::new(),
                },
            );
            let conns = registry.by_user.entry(user_id).or_default();
            conns.insert(conn_id);
            conns.len() == 1
        };

        if first {
            self.announce(user_id, UserState::Connected).await;
        }
        (conn_id, rx)
    }

    /// Drop a connection and every index entry pointing at it.
    ///
    /// The user's last connection announces them as disconnected.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let last = {
            let mut registry = self.inner.registry.write().await;
            let Some(conn) = registry.connections.remove(&conn_id) else {
                return;
            };

            for room in &conn.rooms {
                if let Some(members) = registry.rooms.get_mut(room) {
                    members.remove(&conn_id);
                    if members.is_empty() {
                        registry.rooms.remove(room);
                    }
                }
            }

            let mut last = None;
            if let Some(conns) = registry.by_user.get_mut(&conn.user_id) {
                conns.remove(&conn_id);
                if conns.is_empty() {
                    registry.by_user.remove(&conn.user_id);
                    last = Some(conn.user_id);
                }
            }
            last
        };

        if let Some(user_id) = last {
            self.announce(user_id, UserState::Disconnected).await;
        }
    }

    /// Returns false when the connection is unknown.
    pub async fn subscribe(&self, conn_id: Uuid, room: &str) -> bool {
        let mut registry = self.inner.registry.write().await;
        let Some(conn) = registry.connections.get_mut(&conn_id) else {
            return false;
        };
        conn.rooms.insert(room.to_string());
        registry
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id);
        true
    }

    /// Leaves `room` only; other rooms of the connection are kept.
    pub async fn unsubscribe(&self, conn_id: Uuid, room: &str) {
        let mut registry = self.inner.registry.write().await;
        if let Some(conn) = registry.connections.get_mut(&conn_id) {
            conn.rooms.remove(room);
        }
        if let Some(members) = registry.rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                registry.rooms.remove(room);
            }
        }
    }

    pub async fn is_subscribed(&self, conn_id: Uuid, room: &str) -> bool {
        self.inner
            .registry
            .read()
            .await
            .connections
            .get(&conn_id)
            .is_some_and(|c| c.rooms.contains(room))
    }

    /// Send an event to every live connection of `user_id`. Returns how many
    /// connections it was handed to.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> usize {
        let registry = self.inner.registry.read().await;
        let Some(conns) = registry.by_user.get(&user_id) else {
            return 0;
        };

        let mut sent = 0;
        for conn_id in conns {
            if let Some(conn) = registry.connections.get(conn_id) {
                if conn.tx.send(event.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Send an event to every connection in the namespace.
    pub async fn broadcast(&self, event: GatewayEvent) -> usize {
        let registry = self.inner.registry.read().await;
        registry
            .connections
            .values()
            .filter(|conn| conn.tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.registry.read().await.connections.len()
    }

    #[cfg(test)]
    pub async fn room_size(&self, room: &str) -> usize {
        self.inner
            .registry
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    async fn announce(&self, user_id: Uuid, state: UserState) {
        match state {
            UserState::Connected => info!("{} is online", user_id),
            UserState::Disconnected => info!("{} is offline", user_id),
        }
        if let Err(e) = self
            .inner
            .bus
            .publish(ClusterEvent::UserState { user_id, state })
            .await
        {
            warn!("Failed to publish presence of {}: {}", user_id, e);
        } else {
            debug!("Presence of {} published", user_id);
        }
    }
}
