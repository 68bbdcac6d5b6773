use crate::core::session::SessionEntry;
use crate::protocol::SessionId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Concurrent map of live discovery sessions, keyed by session token
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, entry: Arc<SessionEntry>) {
        self.sessions.write().insert(entry.id(), entry);
    }

    pub fn lookup(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<SessionEntry>> {
        self.sessions.write().remove(id)
    }

    /// Remove and return every registered session
    pub fn drain(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.write().drain().map(|(_, entry)| entry).collect()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
