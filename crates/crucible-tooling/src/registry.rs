//! Tracking of open connections.
//!
//! A host that opens connections from several threads keeps one
//! [`ConnectionRegistry`] and sweeps it on exit with
//! [`close_all_now`](ConnectionRegistry::close_all_now). The registry is an
//! ordinary value: create it at startup, clone it wherever connections are
//! opened, drain it at teardown.

use crate::config::ConnectionParameters;
use crate::executor::AsyncActionExecutor;
use crate::project_connection::ProjectConnection;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection.
///
/// Two connections with identical parameters are still distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Told when a connection has been closed cooperatively.
pub trait ConnectionLifecycleListener: Send + Sync {
    fn connection_closed(&self, connection: &ProjectConnection);
}

type Entries = DashMap<ConnectionId, Arc<ProjectConnection>>;

/// Removes closed connections from the registry that created them.
struct RegistryListener {
    entries: Weak<Entries>,
}

impl ConnectionLifecycleListener for RegistryListener {
    fn connection_closed(&self, connection: &ProjectConnection) {
        // registry already dropped: nothing left to remove from
        if let Some(entries) = self.entries.upgrade() {
            entries.remove(&connection.id());
            debug!(
                connection_id = %connection.id(),
                open = entries.len(),
                "Connection left registry"
            );
        }
    }
}

/// Connections opened and not yet closed with
/// [`ProjectConnection::close`].
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Entries>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection over `executor` and register it.
    pub fn connect(
        &self,
        executor: Arc<dyn AsyncActionExecutor>,
        parameters: ConnectionParameters,
    ) -> Arc<ProjectConnection> {
        let id = ConnectionId::new();
        let listener = Arc::new(RegistryListener {
            entries: Arc::downgrade(&self.entries),
        });
        let connection = Arc::new(ProjectConnection::new(
            id,
            executor,
            Arc::new(parameters),
            listener,
        ));

        self.entries.insert(id, Arc::clone(&connection));
        info!(
            connection_id = %id,
            display_name = %connection.display_name(),
            project_dir = %connection.parameters().project_dir.display(),
            "Connection opened"
        );
        connection
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<ProjectConnection>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// The open connections at this instant, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<ProjectConnection>> {
        let mut connections: Vec<_> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        connections.sort_by_key(|connection| connection.id());
        connections
    }

    /// Force every open connection down. Membership is unchanged; entries
    /// only leave through a cooperative close.
    pub fn close_all_now(&self) {
        let connections = self.snapshot();
        info!(count = connections.len(), "Stopping all connections immediately");
        for connection in connections {
            connection.close_now();
        }
    }

    /// Close every open connection cooperatively, waiting for in-flight
    /// work on each.
    pub fn close_all(&self) {
        let connections = self.snapshot();
        info!(count = connections.len(), "Closing all connections");
        for connection in connections {
            connection.close();
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("open", &self.entries.len())
            .finish()
    }
}
