use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Clock, SessionId, SessionRecord, SessionStore, SystemClock};
use crate::{Result, UserId};

/// An in-memory session store.
///
/// All state lives in a single lock-protected map. Clones share that map, so
/// a store can be handed to several strategies or tasks. Nothing is persisted:
/// sessions vanish with the process unless wrapped in
/// [`Persisted`](super::Persisted).
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Creates an empty store stamping records with the system clock.
    pub fn new() -> Self {
        Self {
            sessions: Arc::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamps new records with the given clock instead.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the number of records held, live or not yet evicted.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no record is held.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>> {
        if user_id.is_empty() {
            return Ok(None);
        }

        let record = SessionRecord::new(user_id.clone(), self.clock.now())?;
        self.sessions
            .write()
            .await
            .insert(record.session_id.clone(), record.clone());

        Ok(Some(record))
    }

    async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn destroy_for_user(&self, user_id: &UserId) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.user_id != *user_id);

        Ok(before - sessions.len())
    }

    async fn restore(&self, record: SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .entry(record.session_id.clone())
            .or_insert(record);

        Ok(())
    }
}
