//! Session registry (C2) — §4.2.
//!
//! A plain map guarded by a short-lived `std::sync::RwLock` is enough here:
//! every session-state check the registry needs
//! ([`ClientSession::is_closed`]) is a lock-free atomic load, so the
//! critical section never spans an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::future::join_all;
use tracing::info;

use pipegate_types::ConnectionId;

use crate::error::TunnelError;
use crate::session::ClientSession;

/// The live set of connected tunnel sessions, keyed by connection id.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<ConnectionId, Arc<ClientSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Atomically claim `conn_id` for `session`, unless a session already
    /// occupies it and is not yet `Closed` (§3 invariant 1, §4.2).
    ///
    /// A closed occupant is replaced rather than treated as a conflict: the
    /// client that owned it has already disconnected, and a Registering
    /// successor is racing its teardown (§4.5).
    pub fn try_register(
        &self,
        conn_id: ConnectionId,
        session: Arc<ClientSession>,
    ) -> Result<(), TunnelError> {
        let mut map = self.inner.write().unwrap();
        if let Some(existing) = map.get(&conn_id)
            && !existing.is_closed()
        {
            return Err(TunnelError::ConnIdInUse);
        }
        map.insert(conn_id, session);
        Ok(())
    }

    /// Look up the session for `conn_id`, if one is registered. The
    /// returned handle may already be `Draining`; callers must still check
    /// state before dispatching (§4.4 step 4).
    pub fn lookup(&self, conn_id: ConnectionId) -> Option<Arc<ClientSession>> {
        self.inner.read().unwrap().get(&conn_id).cloned()
    }

    /// Remove `session` from the registry, but only if it is still the
    /// occupant — compared by pointer identity, not just by `conn_id`, so a
    /// stale drain never evicts a successor that has already replaced it
    /// (§4.2, §4.3).
    pub fn unregister(&self, conn_id: ConnectionId, session: &Arc<ClientSession>) {
        let mut map = self.inner.write().unwrap();
        if let Some(existing) = map.get(&conn_id)
            && Arc::ptr_eq(existing, session)
        {
            map.remove(&conn_id);
        }
    }

    /// Number of sessions currently registered (including any mid-drain).
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// Drain every registered session, bounded by `deadline` (§4.7 graceful
    /// shutdown). Sessions that do not finish draining within the deadline
    /// are left to the process exit to reclaim.
    pub async fn drain_all(&self, deadline: Duration) {
        let sessions: Vec<Arc<ClientSession>> =
            self.inner.read().unwrap().values().cloned().collect();
        info!(count = sessions.len(), "draining active sessions for shutdown");

        let registry = self.clone();
        let drains = sessions
            .iter()
            .map(|session| session.begin_drain(TunnelError::TunnelClosed, &registry));

        let _ = tokio::time::timeout(deadline, join_all(drains)).await;
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `ClientSession::new` needs a live `SplitSink<WebSocket, _>`, which
    // only a real upgrade produces. Register/lookup/unregister behavior
    // against real sessions is covered by `tests/server_integration.rs`;
    // what's testable in isolation here is the empty-registry baseline.

    #[test]
    fn new_registry_is_empty() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(registry.lookup(ConnectionId::new()).is_none());
    }
}
