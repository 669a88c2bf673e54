//! Durable storage for session records.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

pub use self::file::FileBackend;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteBackend;
use crate::{
    session::{SessionId, SessionRecord},
    UserId,
};

mod file;
#[cfg(feature = "sqlite")]
mod sqlite;

/// An error raised by a persistence backend.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// A mapping to `std::io::Error`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A mapping to `serde_json::Error`.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A mapping to `sqlx::Error`.
    #[cfg(feature = "sqlite")]
    #[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// A durable home for session records, keyed by session id.
///
/// Calls may be slow; callers must not hold a store lock across them.
#[async_trait]
pub trait PersistenceBackend: Debug + Send + Sync + 'static {
    /// Loads every persisted record.
    async fn load_all(&self) -> Result<Vec<SessionRecord>, PersistenceError>;

    /// Finds the record persisted under `session_id`.
    async fn find(&self, session_id: &SessionId)
        -> Result<Option<SessionRecord>, PersistenceError>;

    /// Persists `record`, replacing any record with the same id.
    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError>;

    /// Deletes the record persisted under `session_id`, returning whether one
    /// existed.
    async fn delete(&self, session_id: &SessionId) -> Result<bool, PersistenceError>;

    /// Deletes every record belonging to `user_id`, returning how many
    /// existed.
    async fn delete_for_user(&self, user_id: &UserId) -> Result<usize, PersistenceError>;
}

#[async_trait]
impl<B: PersistenceBackend> PersistenceBackend for Arc<B> {
    async fn load_all(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        (**self).load_all().await
    }

    async fn find(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        (**self).find(session_id).await
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        (**self).save(record).await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, PersistenceError> {
        (**self).delete(session_id).await
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<usize, PersistenceError> {
        (**self).delete_for_user(user_id).await
    }
}
