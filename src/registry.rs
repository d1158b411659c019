//! Pool-wide session table + extranonce registry (C2/§3 `ExtranonceRegistry`,
//! §5 "Shared resources"), sharing one read-write lock so a broadcast
//! snapshot is always consistent with registration/removal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::extranonce::random_hex4;
use crate::session::Session;

struct Inner {
    sessions: HashMap<Uuid, Arc<Session>>,
    extranonces: HashSet<String>,
}

/// Shared registry of live sessions and issued extranonces. Broadcast holds
/// the read lock; registration/removal hold the write lock (§5).
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner { sessions: HashMap::new(), extranonces: HashSet::new() }),
        }
    }

    /// Issues a fresh 4-hex extranonce, retrying on collision under the
    /// write lock until a value not currently held is found (§4.2).
    pub fn issue_extranonce(&self) -> String {
        loop {
            let candidate = random_hex4();
            let mut inner = self.inner.write();
            if inner.extranonces.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Registers a new session under the same write lock used for
    /// extranonce issuance, keeping the table and registry in lockstep.
    pub fn register(&self, session: Arc<Session>) {
        let mut inner = self.inner.write();
        inner.sessions.insert(session.id, session);
    }

    /// Removes a session and releases its extranonce (§3 lifecycles).
    pub fn remove(&self, id: Uuid) -> Option<Arc<Session>> {
        let mut inner = self.inner.write();
        let session = inner.sessions.remove(&id)?;
        inner.extranonces.remove(&session.extranonce);
        Some(session)
    }

    /// Read-locked snapshot of all live sessions, for the broadcaster to
    /// iterate without holding the lock across pushes (§4.7).
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner.read().sessions.values().cloned().collect()
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().sessions.len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
