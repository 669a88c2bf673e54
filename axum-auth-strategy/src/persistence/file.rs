use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::{fs, sync::Mutex};

use super::{PersistenceBackend, PersistenceError};
use crate::{
    session::{SessionId, SessionRecord},
    UserId,
};

type Records = BTreeMap<SessionId, SessionRecord>;

/// Persists every record in one JSON document, keyed by session id.
///
/// Each write rewrites the document to a sibling temporary file and renames
/// it into place, so readers never observe a half-written file. Writers are
/// serialized through a mutex shared by clones of the backend; separate
/// processes writing the same file are not coordinated.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileBackend {
    /// Creates a backend storing records at `path`.
    ///
    /// The file is created on the first write; a missing file reads as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::default(),
        }
    }

    /// Returns the path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Records, PersistenceError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Records::new()),
            Err(err) => return Err(err.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Records::new());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write(&self, records: &Records) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    async fn load_all(&self) -> Result<Vec<SessionRecord>, PersistenceError> {
        Ok(self.read().await?.into_values().collect())
    }

    async fn find(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, PersistenceError> {
        Ok(self.read().await?.remove(session_id))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read().await?;
        records.insert(record.session_id.clone(), record.clone());
        self.write(&records).await
    }

    async fn delete(&self, session_id: &SessionId) -> Result<bool, PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read().await?;
        if records.remove(session_id).is_none() {
            return Ok(false);
        }
        self.write(&records).await?;

        Ok(true)
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<usize, PersistenceError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.read().await?;
        let before = records.len();
        records.retain(|_, record| record.user_id != *user_id);

        let removed = before - records.len();
        if removed > 0 {
            self.write(&records).await?;
        }

        Ok(removed)
    }
}
