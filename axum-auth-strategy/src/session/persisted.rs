use async_trait::async_trait;

use super::{SessionId, SessionRecord, SessionStore};
use crate::{persistence::PersistenceBackend, Result, UserId};

/// Wraps a store so sessions outlive the process.
///
/// Every created record is mirrored to the backend and every destroyed one
/// removed from it. Lookups that miss the wrapped store fall back to the
/// backend and restore what they find before re-checking through the wrapped
/// store, so layers such as [`Expiring`](super::Expiring) still apply to
/// reloaded records.
///
/// Deletions reach the backend before the wrapped store, and a reload is
/// confirmed against the backend after it is restored, so a session destroyed
/// while another task reloads it stays destroyed.
///
/// The wrapped store's lock is never held across backend I/O. Backend
/// failures propagate as [`Error::Persistence`](crate::Error::Persistence).
#[derive(Debug, Clone)]
pub struct Persisted<S, B> {
    inner: S,
    backend: B,
}

impl<S: SessionStore, B: PersistenceBackend> Persisted<S, B> {
    /// Wraps `inner`, mirroring it to `backend`.
    pub fn new(inner: S, backend: B) -> Self {
        Self { inner, backend }
    }

    /// Restores every persisted record into the wrapped store, returning how
    /// many were read.
    ///
    /// Lookups reload records on demand anyway; warming up front only saves
    /// the first request per session a backend round trip.
    #[tracing::instrument(level = "debug", skip_all, ret, err)]
    pub async fn warm(&self) -> Result<usize> {
        let records = self.backend.load_all().await?;
        let count = records.len();
        for record in records {
            self.inner.restore(record).await?;
        }

        Ok(count)
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<S: SessionStore, B: PersistenceBackend> SessionStore for Persisted<S, B> {
    async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>> {
        let Some(record) = self.inner.create(user_id).await? else {
            return Ok(None);
        };

        if let Err(err) = self.backend.save(&record).await {
            tracing::error!(err = %err, "could not persist session; rolling back");
            if let Err(rollback) = self.inner.destroy(&record.session_id).await {
                tracing::error!(err = %rollback, "could not roll back unpersisted session");
            }
            return Err(err.into());
        }

        Ok(Some(record))
    }

    async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
        if let Some(record) = self.inner.lookup(session_id).await? {
            return Ok(Some(record));
        }

        let Some(stored) = self.backend.find(session_id).await? else {
            return Ok(None);
        };
        self.inner.restore(stored).await?;

        // A destroy may have landed between the read and the restore. It
        // deletes the durable copy first, so its absence here means the
        // restored record must go too.
        if self.backend.find(session_id).await?.is_none() {
            self.inner.destroy(session_id).await?;
            return Ok(None);
        }

        match self.inner.lookup(session_id).await? {
            Some(record) => Ok(Some(record)),
            None => {
                // The wrapped store rejected the reloaded record, i.e. it has
                // expired; evict the durable copy too.
                self.backend.delete(session_id).await?;
                Ok(None)
            }
        }
    }

    async fn destroy(&self, session_id: &SessionId) -> Result<bool> {
        let persisted = self.backend.delete(session_id).await?;
        let in_memory = self.inner.destroy(session_id).await?;

        Ok(in_memory || persisted)
    }

    async fn destroy_for_user(&self, user_id: &UserId) -> Result<usize> {
        let persisted = self.backend.delete_for_user(user_id).await?;
        let in_memory = self.inner.destroy_for_user(user_id).await?;

        Ok(persisted.max(in_memory))
    }

    async fn restore(&self, record: SessionRecord) -> Result<()> {
        self.inner.restore(record).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use time::{Duration, OffsetDateTime};
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        persistence::{FileBackend, PersistenceError},
        session::{ExpirationPolicy, Expiring, ManualClock, MemorySessionStore},
        Error,
    };

    #[derive(Debug)]
    struct BrokenBackend;

    fn broken() -> PersistenceError {
        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into()
    }

    #[async_trait]
    impl PersistenceBackend for BrokenBackend {
        async fn load_all(&self) -> std::result::Result<Vec<SessionRecord>, PersistenceError> {
            Err(broken())
        }

        async fn find(
            &self,
            _: &SessionId,
        ) -> std::result::Result<Option<SessionRecord>, PersistenceError> {
            Err(broken())
        }

        async fn save(&self, _: &SessionRecord) -> std::result::Result<(), PersistenceError> {
            Err(broken())
        }

        async fn delete(&self, _: &SessionId) -> std::result::Result<bool, PersistenceError> {
            Err(broken())
        }

        async fn delete_for_user(
            &self,
            _: &UserId,
        ) -> std::result::Result<usize, PersistenceError> {
            Err(broken())
        }
    }

    /// Pauses the first `find` after it has read, until released.
    #[derive(Debug, Clone)]
    struct PausedBackend {
        inner: FileBackend,
        armed: Arc<AtomicBool>,
        read: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl PausedBackend {
        fn new(inner: FileBackend) -> Self {
            Self {
                inner,
                armed: Arc::new(AtomicBool::new(true)),
                read: Arc::default(),
                release: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl PersistenceBackend for PausedBackend {
        async fn load_all(&self) -> std::result::Result<Vec<SessionRecord>, PersistenceError> {
            self.inner.load_all().await
        }

        async fn find(
            &self,
            session_id: &SessionId,
        ) -> std::result::Result<Option<SessionRecord>, PersistenceError> {
            let found = self.inner.find(session_id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.read.notify_one();
                self.release.notified().await;
            }
            Ok(found)
        }

        async fn save(&self, record: &SessionRecord) -> std::result::Result<(), PersistenceError> {
            self.inner.save(record).await
        }

        async fn delete(
            &self,
            session_id: &SessionId,
        ) -> std::result::Result<bool, PersistenceError> {
            self.inner.delete(session_id).await
        }

        async fn delete_for_user(
            &self,
            user_id: &UserId,
        ) -> std::result::Result<usize, PersistenceError> {
            self.inner.delete_for_user(user_id).await
        }
    }

    /// Fails every destroy, so rollbacks fail.
    #[derive(Debug, Default)]
    struct StickyStore(MemorySessionStore);

    #[async_trait]
    impl SessionStore for StickyStore {
        async fn create(&self, user_id: &UserId) -> Result<Option<SessionRecord>> {
            self.0.create(user_id).await
        }

        async fn lookup(&self, session_id: &SessionId) -> Result<Option<SessionRecord>> {
            self.0.lookup(session_id).await
        }

        async fn destroy(&self, _: &SessionId) -> Result<bool> {
            Err(Error::Config("read-only store".into()))
        }

        async fn destroy_for_user(&self, _: &UserId) -> Result<usize> {
            Err(Error::Config("read-only store".into()))
        }

        async fn restore(&self, record: SessionRecord) -> Result<()> {
            self.0.restore(record).await
        }
    }

    fn stack(
        backend: FileBackend,
        clock: &ManualClock,
        seconds: u64,
    ) -> Persisted<Expiring<MemorySessionStore>, FileBackend> {
        let memory = MemorySessionStore::new().with_clock(clock.clone());
        let expiring =
            Expiring::new(memory, ExpirationPolicy::from_secs(seconds)).with_clock(clock.clone());
        Persisted::new(expiring, backend)
    }

    #[tokio::test]
    async fn test_create_is_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("sessions.json"));
        let store = stack(backend.clone(), &ManualClock::default(), 0);

        let record = store.create(&UserId::new("alice")).await.unwrap().unwrap();
        assert_eq!(
            backend.find(&record.session_id).await.unwrap(),
            Some(record)
        );
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let clock = ManualClock::default();

        let token = stack(FileBackend::new(&path), &clock, 0)
            .create(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap()
            .session_id;

        // A fresh in-memory store, as after a process restart.
        let restarted = stack(FileBackend::new(&path), &clock, 0);
        assert!(restarted.inner().inner().is_empty().await);
        assert_eq!(
            restarted.user_id_for_session(&token).await.unwrap(),
            Some(UserId::new("alice"))
        );
        assert_eq!(restarted.inner().inner().len().await, 1);
    }

    #[tokio::test]
    async fn test_warm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let clock = ManualClock::default();
        let store = stack(FileBackend::new(&path), &clock, 0);
        store.create(&UserId::new("alice")).await.unwrap();
        store.create(&UserId::new("bob")).await.unwrap();

        let restarted = stack(FileBackend::new(&path), &clock, 0);
        assert_eq!(restarted.warm().await.unwrap(), 2);
        assert_eq!(restarted.inner().inner().len().await, 2);
    }

    #[tokio::test]
    async fn test_destroy_removes_both_copies() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("sessions.json"));
        let store = stack(backend.clone(), &ManualClock::default(), 0);
        let token = store
            .create(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap()
            .session_id;

        assert!(store.destroy(&token).await.unwrap());
        assert_eq!(backend.find(&token).await.unwrap(), None);
        assert_eq!(store.lookup(&token).await.unwrap(), None);
        assert!(!store.destroy(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_reload_is_evicted_from_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);

        let token = stack(FileBackend::new(&path), &clock, 1)
            .create(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap()
            .session_id;

        clock.advance(Duration::seconds(2));
        let backend = FileBackend::new(&path);
        let restarted = stack(backend.clone(), &clock, 1);

        assert_eq!(restarted.lookup(&token).await.unwrap(), None);
        assert_eq!(backend.find(&token).await.unwrap(), None);
        assert!(restarted.inner().inner().is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_in_memory_record_is_evicted_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("sessions.json"));
        let clock = ManualClock::new(OffsetDateTime::UNIX_EPOCH);
        let store = stack(backend.clone(), &clock, 1);
        let token = store
            .create(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap()
            .session_id;

        clock.advance(Duration::seconds(2));
        assert_eq!(store.user_id_for_session(&token).await.unwrap(), None);
        assert_eq!(backend.find(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_save_is_reported_and_rolled_back() {
        let memory = MemorySessionStore::new();
        let store = Persisted::new(memory.clone(), BrokenBackend);

        let result = store.create(&UserId::new("alice")).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(memory.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_rollback_still_reports_save_error() {
        let store = Persisted::new(StickyStore::default(), BrokenBackend);

        let result = store.create(&UserId::new("alice")).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_destroy_during_reload_stays_destroyed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let token = Persisted::new(MemorySessionStore::new(), FileBackend::new(&path))
            .create(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap()
            .session_id;

        let backend = PausedBackend::new(FileBackend::new(&path));
        let memory = MemorySessionStore::new();
        let store = Arc::new(Persisted::new(memory.clone(), backend.clone()));

        let reload = tokio::spawn({
            let store = store.clone();
            let token = token.clone();
            async move { store.lookup(&token).await.unwrap() }
        });

        // The reload has read the durable copy but not yet restored it.
        backend.read.notified().await;
        assert!(store.destroy(&token).await.unwrap());
        backend.release.notify_one();

        assert_eq!(reload.await.unwrap(), None);
        assert_eq!(store.lookup(&token).await.unwrap(), None);
        assert!(memory.is_empty().await);
        assert_eq!(FileBackend::new(&path).find(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_for_user_reaches_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let clock = ManualClock::default();
        let alice = UserId::new("alice");

        let before_restart = stack(FileBackend::new(&path), &clock, 0);
        let reloaded = before_restart.create(&alice).await.unwrap().unwrap();
        let bob = before_restart
            .create(&UserId::new("bob"))
            .await
            .unwrap()
            .unwrap();

        let store = stack(FileBackend::new(&path), &clock, 0);
        assert!(store.lookup(&reloaded.session_id).await.unwrap().is_some());
        let unreloaded = store.create(&alice).await.unwrap().unwrap();

        assert_eq!(store.destroy_for_user(&alice).await.unwrap(), 2);
        assert_eq!(store.lookup(&reloaded.session_id).await.unwrap(), None);
        assert_eq!(store.lookup(&unreloaded.session_id).await.unwrap(), None);
        assert_eq!(store.lookup(&bob.session_id).await.unwrap(), Some(bob));
    }

    #[tokio::test]
    async fn test_failed_reload_is_reported() {
        let store = Persisted::new(MemorySessionStore::new(), BrokenBackend);

        let result = store.lookup(&SessionId::from("unknown")).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn test_empty_user_id_skips_backend() {
        let store = Persisted::new(MemorySessionStore::new(), BrokenBackend);

        assert_eq!(store.create(&UserId::new("")).await.unwrap(), None);
    }
}
